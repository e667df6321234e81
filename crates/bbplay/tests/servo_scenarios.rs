//! 舵机控制端到端场景
//!
//! 使用 Mock 引脚驱动，由测试自己驱动写入周期，结果不依赖写入线程的节拍。

use bbplay::hw::{CycleWrite, DutyCycleRange, PinSet, ServoConfig};
use bbplay::pins::MockPinDriver;
use bbplay::prelude::*;
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

const EPS: f64 = 1e-12;

fn servo(signal: &str, min: f64, max: f64) -> ServoConfig {
    ServoConfig {
        pins: PinSet::new(signal),
        duty_cycle: DutyCycleRange { min, max },
    }
}

fn config(servos: Vec<ServoConfig>, strict: bool) -> HardwareConfig {
    let mut config = HardwareConfig::default();
    config.servos = servos;
    config.queue.strict = strict;
    config.queue.max_idle_ms = 2;
    config.queue.min_busy_ms = 1;
    config
}

fn start(mock: &Arc<MockPinDriver>, config: HardwareConfig) -> Hardware {
    Hardware::start_without_writer(config, mock.clone()).expect("hardware should start")
}

fn wait_all(writes: Vec<CycleWrite>) {
    for write in writes {
        write.handle.wait().expect("write should succeed");
    }
}

#[test]
fn coalesced_targets_produce_single_write() {
    let mock = Arc::new(MockPinDriver::new());
    let hw = start(&mock, config(vec![servo("P9_14", 0.046, 0.134)], true));

    hw.servos().queue_position(0, 0.2).unwrap();
    hw.servos().queue_position(0, 0.9).unwrap();
    wait_all(hw.servos().run_cycle());

    let writes = mock.writes(&PinId::from("P9_14"));
    assert_eq!(writes.len(), 1);
    assert!((writes[0].0 - 0.1252).abs() < EPS);
    assert_eq!(hw.servos().read(0).unwrap().position, Some(0.9));
}

#[test]
fn init_seeds_first_write() {
    let mock = Arc::new(MockPinDriver::new());
    let hw = start(&mock, config(vec![servo("P9_14", 0.046, 0.134)], true));

    for handle in hw.servos().init(0.5).unwrap() {
        handle.wait().unwrap();
    }
    wait_all(hw.servos().run_cycle());

    let pin = PinId::from("P9_14");
    assert_eq!(mock.mode(&pin), Some(PinMode::Output));
    let (duty, _) = mock.writes(&pin)[0];
    assert!((duty - 0.09).abs() < EPS);
    assert_eq!(hw.servos().read(0).unwrap().position, Some(0.5));
}

#[test]
fn unknown_servo_is_not_found() {
    let mock = Arc::new(MockPinDriver::new());
    let hw = start(
        &mock,
        config(
            vec![servo("P9_14", 0.046, 0.134), servo("P9_16", 0.046, 0.134)],
            true,
        ),
    );

    assert!(!hw.servos().exists(5));
    let err = hw.servos().set_position(5, 0.5).unwrap_err();
    assert!(matches!(err, ControlError::NotFound { id: 5, .. }));
    // 没有触碰队列
    assert_eq!(hw.queue().metrics().submitted, 0);
}

#[test]
fn target_arriving_while_busy_waits_for_next_cycle() {
    let mock = Arc::new(MockPinDriver::new());
    mock.set_pin_latency("P9_14", Duration::from_millis(100));
    let hw = start(&mock, config(vec![servo("P9_14", 0.046, 0.134)], false));
    let servos = hw.servos();

    servos.queue_position(0, 0.1).unwrap();
    let in_flight = servos.run_cycle();
    assert_eq!(in_flight.len(), 1);

    servos.queue_position(0, 0.6).unwrap();
    assert!(servos.is_busy(0).unwrap());
    assert!(servos.run_cycle().is_empty());
    assert_eq!(servos.pending(0).unwrap(), Some(0.6));

    wait_all(in_flight);
    wait_all(servos.run_cycle());

    let pin = PinId::from("P9_14");
    let writes = mock.writes(&pin);
    assert_eq!(writes.len(), 2);
    assert!((writes[0].0 - (0.046 + 0.1 * 0.088)).abs() < EPS);
    assert!((writes[1].0 - (0.046 + 0.6 * 0.088)).abs() < EPS);
    assert_eq!(mock.max_concurrent_writes(&pin), 1);
    assert_eq!(servos.read(0).unwrap().position, Some(0.6));
}

#[test]
fn rejecting_policy_surfaces_busy() {
    let mock = Arc::new(MockPinDriver::new());
    mock.set_pin_latency("P9_14", Duration::from_millis(80));
    let mut cfg = config(vec![servo("P9_14", 0.046, 0.134)], false);
    cfg.servo.policy = WritePolicy::RejectWhenBusy;
    let hw = start(&mock, cfg);

    let first = hw.servos().set_position(0, 0.3).unwrap().unwrap();
    assert!(matches!(
        hw.servos().set_position(0, 0.4),
        Err(ControlError::Busy { id: 0 })
    ));
    first.wait().unwrap();
    assert_eq!(hw.servos().read(0).unwrap().position, Some(0.3));
}

#[test]
fn hardware_fault_is_reported_and_servo_recovers() {
    let mock = Arc::new(MockPinDriver::new());
    mock.fail_pin("P9_14");
    let hw = start(&mock, config(vec![servo("P9_14", 0.046, 0.134)], true));

    hw.servos().queue_position(0, 0.5).unwrap();
    for write in hw.servos().run_cycle() {
        assert!(matches!(write.handle.wait(), Err(DriverError::Pin(_))));
    }
    assert!(!hw.servos().is_busy(0).unwrap());
    assert_eq!(hw.servos().read(0).unwrap().position, None);

    mock.heal_pin(&PinId::from("P9_14"));
    hw.servos().queue_position(0, 0.5).unwrap();
    wait_all(hw.servos().run_cycle());
    assert_eq!(hw.servos().read(0).unwrap().position, Some(0.5));
}

#[test]
fn background_writer_never_overlaps_writes_per_servo() {
    let mock = Arc::new(MockPinDriver::new());
    mock.set_write_latency(Duration::from_millis(30));
    let mut cfg = config(
        vec![servo("P9_14", 0.046, 0.134), servo("P9_16", 0.05, 0.1)],
        false,
    );
    cfg.servo.write_frequency_hz = 100;
    let hw = Hardware::start(cfg, mock.clone()).unwrap();

    for i in 0..40 {
        let pos = f64::from(i) / 40.0;
        hw.servos().queue_position(0, pos).unwrap();
        hw.servos().queue_position(1, 1.0 - pos).unwrap();
        std::thread::sleep(Duration::from_millis(3));
    }
    std::thread::sleep(Duration::from_millis(200));

    assert_eq!(mock.max_concurrent_writes(&PinId::from("P9_14")), 1);
    assert_eq!(mock.max_concurrent_writes(&PinId::from("P9_16")), 1);
    // 最后一个目标一定会落地
    assert_eq!(hw.servos().read(0).unwrap().position, Some(39.0 / 40.0));
    assert_eq!(hw.servos().read(1).unwrap().position, Some(1.0 - 39.0 / 40.0));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn burst_within_one_cycle_writes_last_target(positions in prop::collection::vec(-0.5f64..1.5, 1..12)) {
        let mock = Arc::new(MockPinDriver::new());
        let hw = start(&mock, config(vec![servo("P9_14", 0.046, 0.134)], true));

        for &p in &positions {
            hw.servos().queue_position(0, p).unwrap();
        }
        let writes = hw.servos().run_cycle();
        prop_assert_eq!(writes.len(), 1);
        wait_all(writes);

        let last = positions[positions.len() - 1].clamp(0.0, 1.0);
        let recorded = mock.writes(&PinId::from("P9_14"));
        prop_assert_eq!(recorded.len(), 1);
        prop_assert!((recorded[0].0 - (0.046 + last * 0.088)).abs() < 1e-9);
        prop_assert_eq!(hw.servos().read(0).unwrap().position, Some(last));
    }
}
