//! End-to-end tests against the scripted fake sensor.

mod common;

use common::FakeSensor;
use embedded_hal_mock::eh1::delay::NoopDelay;
use vl53l5cx::{
    Error, PowerMode, RangingMode, RangingOutputs, Resolution, TargetOrder, Vl53l5cx,
};

fn booted_sensor() -> Vl53l5cx<FakeSensor, NoopDelay> {
    let mut sensor = Vl53l5cx::new(FakeSensor::new(), NoopDelay);
    sensor.init().unwrap();
    sensor
}

#[test]
fn init_streams_firmware_and_configures_pipe() {
    let sensor = booted_sensor();
    let (fake, _) = sensor.release();
    // Firmware image split over the three download pages.
    assert_eq!(fake.fw_pages, [0x8000, 0x8000, 0x5800]);
    // Boot alone does not start a ranging session.
    assert!(!fake.ranging);
    // Pipe control carries one target per zone, single-range flag is set.
    assert_eq!(fake.dci[&0xDB80], vec![1, 0, 1, 0]);
    assert_eq!(fake.dci[&0xD964], vec![1, 0, 0, 0]);
}

#[test]
fn init_with_multiple_targets_patches_firmware_target_count() {
    let mut sensor = Vl53l5cx::new(FakeSensor::new(), NoopDelay);
    sensor.set_targets_per_zone(4).unwrap();
    sensor.init().unwrap();
    let (fake, _) = sensor.release();
    assert_eq!(fake.dci[&0xDB80], vec![4, 0, 1, 0]);
    assert_eq!(fake.dci[&0x5478][0x0C], 4);
}

#[test]
fn targets_per_zone_bounds_are_enforced() {
    let mut sensor = Vl53l5cx::new(FakeSensor::new(), NoopDelay);
    assert_eq!(sensor.set_targets_per_zone(0), Err(Error::InvalidArgument));
    assert_eq!(sensor.set_targets_per_zone(5), Err(Error::InvalidArgument));
    sensor.set_targets_per_zone(2).unwrap();
    assert_eq!(sensor.targets_per_zone(), 2);
}

#[test]
fn is_alive_checks_identification_bytes() {
    let mut sensor = Vl53l5cx::new(FakeSensor::new(), NoopDelay);
    sensor.is_alive().unwrap();

    let mut fake = FakeSensor::new();
    fake.regs[0x00] = 0x00;
    let mut sensor = Vl53l5cx::new(fake, NoopDelay);
    assert_eq!(sensor.is_alive(), Err(Error::CorruptedFrame));
}

#[test]
fn i2c_address_change_is_followed_by_the_driver() {
    let mut sensor = Vl53l5cx::new(FakeSensor::new(), NoopDelay);
    sensor.set_i2c_address(0x2A).unwrap();
    sensor.is_alive().unwrap();
}

#[test]
fn resolution_round_trips_through_the_device() {
    let mut sensor = booted_sensor();
    assert_eq!(sensor.get_resolution().unwrap(), Resolution::Res4x4);
    sensor.set_resolution(Resolution::Res8x8).unwrap();
    assert_eq!(sensor.get_resolution().unwrap(), Resolution::Res8x8);
    sensor.set_resolution(Resolution::Res4x4).unwrap();
    assert_eq!(sensor.get_resolution().unwrap(), Resolution::Res4x4);
}

#[test]
fn dci_parameters_round_trip() {
    let mut sensor = booted_sensor();
    let data = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88];
    sensor.dci_write_data(&data, 0x5470).unwrap();
    let mut back = [0u8; 8];
    sensor.dci_read_data(&mut back, 0x5470, 8).unwrap();
    assert_eq!(back, data);

    // A parameter big enough that its frame spans several bus chunks.
    let big: Vec<u8> = (0..512u16).map(|i| i as u8).collect();
    sensor.dci_write_data(&big, 0x5C00).unwrap();
    let mut back = vec![0u8; 512];
    sensor.dci_read_data(&mut back, 0x5C00, 512).unwrap();
    assert_eq!(back, big);
}

#[test]
fn oversized_dci_requests_are_rejected_before_any_traffic() {
    let mut sensor = Vl53l5cx::new(FakeSensor::new(), NoopDelay);
    let mut huge = vec![0u8; 8192];
    assert_eq!(
        sensor.dci_read_data(&mut huge, 0x5450, 8192),
        Err(Error::BufferTooSmall)
    );
    let mut short = [0u8; 4];
    assert_eq!(
        sensor.dci_read_data(&mut short, 0x5450, 8),
        Err(Error::BufferTooSmall)
    );
    let (fake, _) = sensor.release();
    assert_eq!(fake.transactions, 0);
}

#[test]
fn frame_size_follows_enabled_outputs_and_resolution() {
    let mut sensor = Vl53l5cx::new(FakeSensor::new(), NoopDelay);
    sensor.set_enabled_outputs(
        RangingOutputs::NB_TARGET_DETECTED
            | RangingOutputs::DISTANCE_MM
            | RangingOutputs::TARGET_STATUS,
    );
    sensor.init().unwrap();
    assert_eq!(sensor.data_read_size(), 0);

    sensor.start_ranging().unwrap();
    assert_eq!(sensor.data_read_size(), 128);
    sensor.stop_ranging().unwrap();
    assert_eq!(sensor.data_read_size(), 0);

    sensor.set_resolution(Resolution::Res8x8).unwrap();
    sensor.start_ranging().unwrap();
    assert_eq!(sensor.data_read_size(), 320);
}

#[test]
fn negotiation_mismatch_fails_start() {
    let mut fake = FakeSensor::new();
    fake.negotiated_override = Some(999);
    let mut sensor = Vl53l5cx::new(fake, NoopDelay);
    sensor.init().unwrap();
    assert_eq!(sensor.start_ranging(), Err(Error::FrameSizeMismatch));
}

#[test]
fn frame_decode_populates_exactly_the_enabled_outputs() {
    let mut sensor = Vl53l5cx::new(FakeSensor::new(), NoopDelay);
    sensor.set_enabled_outputs(
        RangingOutputs::NB_TARGET_DETECTED
            | RangingOutputs::DISTANCE_MM
            | RangingOutputs::TARGET_STATUS,
    );
    sensor.init().unwrap();
    sensor.start_ranging().unwrap();

    assert!(sensor.check_data_ready().unwrap());
    let results = sensor.get_ranging_data().unwrap();
    assert_eq!(sensor.streamcount(), 1);

    assert_eq!(results.silicon_temp_degc, 25);
    // Raw distance 400 scales to 100 mm.
    let distance = results.distance_mm.unwrap();
    assert!(distance[..16].iter().all(|&d| d == 100));
    // Zone 3 reported no target: its status slot is forced to 255.
    let detected = results.nb_target_detected.unwrap();
    assert_eq!(detected[3], 0);
    let status = results.target_status.unwrap();
    assert_eq!(status[3], 255);
    assert!(status[..3].iter().all(|&s| s == 5));

    // Disabled outputs stay absent.
    assert!(results.ambient_per_spad.is_none());
    assert!(results.nb_spads_enabled.is_none());
    assert!(results.signal_per_spad.is_none());
    assert!(results.range_sigma_mm.is_none());
    assert!(results.reflectance.is_none());
    assert!(results.motion_indicator.is_none());
}

#[test]
fn ranging_data_without_a_session_is_rejected() {
    let mut sensor = booted_sensor();
    assert_eq!(sensor.get_ranging_data(), Err(Error::CorruptedFrame));
}

#[test]
fn overlong_block_payloads_are_clipped_to_the_result_arrays() {
    let mut fake = FakeSensor::new();
    fake.overclaim_detected_block = true;
    let mut sensor = Vl53l5cx::new(fake, NoopDelay);
    sensor.set_enabled_outputs(RangingOutputs::NB_TARGET_DETECTED);
    sensor.init().unwrap();
    sensor.set_resolution(Resolution::Res8x8).unwrap();
    sensor.start_ranging().unwrap();

    let results = sensor.get_ranging_data().unwrap();
    let detected = results.nb_target_detected.unwrap();
    assert_eq!(detected[3], 0);
    assert!(detected[..3].iter().all(|&d| d == 1));
}

#[test]
fn truncated_motion_blocks_are_rejected() {
    let mut fake = FakeSensor::new();
    fake.shrink_motion_block = true;
    let mut sensor = Vl53l5cx::new(fake, NoopDelay);
    sensor.set_enabled_outputs(RangingOutputs::MOTION_INDICATOR);
    sensor.init().unwrap();
    sensor.start_ranging().unwrap();
    assert_eq!(sensor.get_ranging_data(), Err(Error::CorruptedFrame));
}

#[test]
fn init_fails_when_firmware_handshake_never_asserts() {
    let mut fake = FakeSensor::new();
    fake.fail_fw_handshake = true;
    let mut sensor = Vl53l5cx::new(fake, NoopDelay);
    assert_eq!(sensor.init(), Err(Error::Timeout));
}

#[test]
fn stop_surfaces_a_firmware_fault_status() {
    let mut fake = FakeSensor::new();
    fake.stop_status = 0x13;
    let mut sensor = Vl53l5cx::new(fake, NoopDelay);
    sensor.init().unwrap();
    sensor.start_ranging().unwrap();
    assert_eq!(sensor.stop_ranging(), Err(Error::Mcu));
    // The session is torn down regardless.
    assert_eq!(sensor.data_read_size(), 0);
}

#[test]
fn frames_with_disagreeing_sequence_ids_are_rejected() {
    let mut fake = FakeSensor::new();
    fake.corrupt_frames = true;
    let mut sensor = Vl53l5cx::new(fake, NoopDelay);
    sensor.set_enabled_outputs(RangingOutputs::DISTANCE_MM);
    sensor.init().unwrap();
    sensor.start_ranging().unwrap();
    assert_eq!(sensor.get_ranging_data(), Err(Error::CorruptedFrame));
}

#[test]
fn ranging_frequency_round_trips_and_validates() {
    let mut sensor = booted_sensor();
    sensor.set_ranging_frequency_hz(10).unwrap();
    assert_eq!(sensor.get_ranging_frequency_hz().unwrap(), 10);
    assert_eq!(sensor.set_ranging_frequency_hz(0), Err(Error::InvalidArgument));
    assert_eq!(sensor.set_ranging_frequency_hz(61), Err(Error::InvalidArgument));
}

#[test]
fn integration_time_round_trips_and_validates() {
    let mut sensor = booted_sensor();
    assert_eq!(sensor.get_integration_time_ms().unwrap(), 5);
    sensor.set_integration_time_ms(20).unwrap();
    assert_eq!(sensor.get_integration_time_ms().unwrap(), 20);
    assert_eq!(sensor.set_integration_time_ms(1), Err(Error::InvalidArgument));
    assert_eq!(
        sensor.set_integration_time_ms(1001),
        Err(Error::InvalidArgument)
    );
}

#[test]
fn sharpener_round_trips_and_validates() {
    let mut sensor = booted_sensor();
    sensor.set_sharpener_percent(40).unwrap();
    assert_eq!(sensor.get_sharpener_percent().unwrap(), 40);
    assert_eq!(sensor.set_sharpener_percent(100), Err(Error::InvalidArgument));
}

#[test]
fn target_order_round_trips() {
    let mut sensor = booted_sensor();
    assert_eq!(sensor.get_target_order().unwrap(), TargetOrder::Strongest);
    sensor.set_target_order(TargetOrder::Closest).unwrap();
    assert_eq!(sensor.get_target_order().unwrap(), TargetOrder::Closest);
}

#[test]
fn ranging_mode_updates_single_range_flag() {
    let mut sensor = booted_sensor();
    assert_eq!(sensor.get_ranging_mode().unwrap(), RangingMode::Continuous);
    sensor.set_ranging_mode(RangingMode::Autonomous).unwrap();
    assert_eq!(sensor.get_ranging_mode().unwrap(), RangingMode::Autonomous);
    sensor.set_ranging_mode(RangingMode::Continuous).unwrap();
    assert_eq!(sensor.get_ranging_mode().unwrap(), RangingMode::Continuous);
    let (fake, _) = sensor.release();
    assert_eq!(fake.dci[&0xD964], vec![0, 0, 0, 0]);
}

#[test]
fn power_mode_round_trips() {
    let mut sensor = booted_sensor();
    assert_eq!(sensor.get_power_mode().unwrap(), PowerMode::Wakeup);
    sensor.set_power_mode(PowerMode::Sleep).unwrap();
    assert_eq!(sensor.get_power_mode().unwrap(), PowerMode::Sleep);
    sensor.set_power_mode(PowerMode::Wakeup).unwrap();
    assert_eq!(sensor.get_power_mode().unwrap(), PowerMode::Wakeup);
}
