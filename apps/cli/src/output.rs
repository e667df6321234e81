//! 输出格式
//!
//! 所有读数以单行 JSON 打印，便于脚本解析。

use bbplay::driver::MetricsSnapshot;
use bbplay::hw::{DeviceInfo, ServoReading, TemperatureReading};
use serde_json::{Value, json};

pub fn device(info: &DeviceInfo) -> Value {
    json!({
        "id": info.id,
        "pins": {
            "signal": info.pins.signal.as_str(),
            "power": info.pins.power.as_ref().map(|p| p.as_str()),
            "ground": info.pins.ground.as_ref().map(|p| p.as_str()),
        },
    })
}

pub fn servo_reading(id: usize, reading: &ServoReading) -> Value {
    json!({
        "id": id,
        "timestamp": reading.timestamp_rfc3339(),
        "position": reading.position,
    })
}

pub fn temperature(id: usize, reading: &TemperatureReading) -> Value {
    json!({
        "id": id,
        "timestamp": reading.timestamp_rfc3339(),
        "millivolts": reading.temperature.millivolts,
        "celsius": reading.temperature.celsius,
        "fahrenheit": reading.temperature.fahrenheit,
    })
}

pub fn metrics(snapshot: &MetricsSnapshot) -> Value {
    json!({
        "submitted": snapshot.submitted,
        "started": snapshot.started,
        "succeeded": snapshot.succeeded,
        "failed": snapshot.failed,
        "idle_ticks": snapshot.idle_ticks,
        "busy_ticks": snapshot.busy_ticks,
        "in_flight": snapshot.in_flight,
        "max_in_flight": snapshot.max_in_flight,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bbplay::hw::{PinSet, Temperature};
    use chrono::{TimeZone, Utc};

    fn reading(position: Option<f64>) -> ServoReading {
        ServoReading {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).single().unwrap(),
            position,
            written_at: None,
        }
    }

    #[test]
    fn test_device_json() {
        let info = DeviceInfo {
            id: 1,
            pins: PinSet::new("P9_14").with_power("P9_5"),
        };
        let value = device(&info);
        assert_eq!(value["id"], 1);
        assert_eq!(value["pins"]["signal"], "P9_14");
        assert_eq!(value["pins"]["power"], "P9_5");
        assert!(value["pins"]["ground"].is_null());
    }

    #[test]
    fn test_servo_reading_json() {
        let value = servo_reading(0, &reading(Some(0.5)));
        assert_eq!(value["position"], 0.5);
        assert_eq!(value["timestamp"], "2024-03-01T12:00:00.000Z");

        let unset = servo_reading(0, &reading(None));
        assert!(unset["position"].is_null());
    }

    #[test]
    fn test_temperature_json() {
        let reading = TemperatureReading {
            timestamp: reading(None).timestamp,
            temperature: Temperature::from_millivolts(250.0),
        };
        let value = temperature(2, &reading);
        assert_eq!(value["id"], 2);
        assert_eq!(value["millivolts"], 250.0);
        assert!((value["celsius"].as_f64().unwrap() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_metrics_json() {
        let snapshot = MetricsSnapshot {
            submitted: 3,
            ..Default::default()
        };
        assert_eq!(metrics(&snapshot)["submitted"], 3);
        assert_eq!(metrics(&snapshot)["failed"], 0);
    }
}
