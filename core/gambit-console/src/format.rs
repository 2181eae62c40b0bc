//! Plain-text rendering for command output and the `watch` feed.

use gambit_protocol::{
    Flight, Mission, RealtimeEvent, RecordDone, RecordStatus, Setting, SystemHealth,
    SystemIndicators,
};

pub fn percent(value: f64) -> String {
    format!("{:.1}%", value)
}

pub fn celsius(value: f64) -> String {
    format!("{:.1}°C", value)
}

/// Human-readable byte count (`1.5 MB`).
pub fn bytes(size: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = size as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", size)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// `mm:ss`, or `h:mm:ss` past the hour.
pub fn duration(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    let (hours, minutes, secs) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}

pub fn indicators(data: &SystemIndicators) -> String {
    format!(
        "cpu {} | temp {} | mem {} | disk {} | battery {} | sat {} | fps {:.1}",
        percent(data.cpu),
        celsius(data.temp),
        percent(data.mem),
        percent(data.disk),
        percent(data.battery),
        data.sat,
        data.fps
    )
}

pub fn health(data: &SystemHealth) -> String {
    let mut line = format!(
        "{} | cpu {} | temp {} | mem {} | disk {} | battery {} | sat fix {} | fps {:.1}",
        data.status,
        percent(data.cpu),
        celsius(data.temp),
        percent(data.memory),
        percent(data.disk),
        percent(data.battery),
        data.sat_fix,
        data.fps
    );
    if let (Some(lat), Some(lon)) = (data.latitude, data.longitude) {
        line.push_str(&format!(" | pos {:.5},{:.5}", lat, lon));
    }
    line
}

pub fn mission(data: &Mission) -> String {
    let mut line = format!("mission {} {}", data.id, data.status);
    if let Some(elapsed) = data.duration {
        line.push_str(&format!(" ({})", duration(elapsed)));
    }
    line
}

pub fn flight(data: &Flight) -> String {
    format!(
        "{}  {}  {:>8}  {}",
        data.id,
        data.date,
        duration(data.duration),
        data.status
    )
}

pub fn setting(data: &Setting) -> String {
    let marker = if data.is_critical { " !" } else { "" };
    format!("{} = {}  ({}){}", data.key, data.value, data.label, marker)
}

pub fn record_status(data: &RecordStatus) -> String {
    if data.recording {
        format!("recording {}", duration(data.duration))
    } else {
        "not recording".to_string()
    }
}

pub fn record_done(data: &RecordDone) -> String {
    format!(
        "recording saved to {} ({}, {})",
        data.path,
        duration(data.duration),
        bytes(data.size)
    )
}

/// One `watch` line: `[event] rendering`.
pub fn event(event: &RealtimeEvent) -> String {
    let body = match event {
        RealtimeEvent::Indicators(data) => indicators(data),
        RealtimeEvent::RecordStatus(data) => record_status(data),
        RealtimeEvent::MissionStatus(data) => mission(data),
        RealtimeEvent::RecordDone(data) => record_done(data),
        RealtimeEvent::Connection(change) => {
            if change.connected {
                "connected".to_string()
            } else {
                "disconnected".to_string()
            }
        }
        RealtimeEvent::Other { data, .. } => data.to_string(),
    };
    format!("[{}] {}", event.name(), body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gambit_protocol::{FlightStatus, HealthStatus, MissionState, SettingKind, SettingValue};
    use serde_json::json;

    #[test]
    fn indicator_units() {
        let line = indicators(&SystemIndicators {
            cpu: 12.34,
            temp: 48.0,
            disk: 30.0,
            mem: 41.5,
            battery: 87.0,
            sat: 11.0,
            fps: 29.97,
            connected: true,
        });
        assert_eq!(
            line,
            "cpu 12.3% | temp 48.0°C | mem 41.5% | disk 30.0% | battery 87.0% | sat 11 | fps 30.0"
        );
    }

    #[test]
    fn durations() {
        assert_eq!(duration(0.0), "00:00");
        assert_eq!(duration(75.4), "01:15");
        assert_eq!(duration(3723.0), "1:02:03");
        assert_eq!(duration(-5.0), "00:00");
    }

    #[test]
    fn byte_sizes() {
        assert_eq!(bytes(512), "512 B");
        assert_eq!(bytes(1536), "1.5 KB");
        assert_eq!(bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn mission_line_includes_duration_when_known() {
        let running = Mission {
            id: "m1".to_string(),
            status: MissionState::Running,
            created_at: None,
            started_at: None,
            completed_at: None,
            duration: Some(61.0),
        };
        assert_eq!(mission(&running), "mission m1 RUNNING (01:01)");
    }

    #[test]
    fn health_and_flight_use_wire_status_names() {
        let data = SystemHealth {
            cpu: 10.0,
            temp: 45.0,
            disk: 20.0,
            memory: 30.0,
            battery: 90.0,
            sat_fix: 1.0,
            fps: 30.0,
            latitude: None,
            longitude: None,
            status: HealthStatus::Warning,
            timestamp: "2026-01-30T12:00:00Z".to_string(),
        };
        assert!(health(&data).starts_with("WARNING | cpu 10.0%"));

        let row = flight(&Flight {
            id: "f1".to_string(),
            date: "2026-01-30".to_string(),
            duration: 125.0,
            status: FlightStatus::Completed,
        });
        assert_eq!(row, "f1  2026-01-30     02:05  COMPLETED");
    }

    #[test]
    fn setting_marks_critical() {
        let data = Setting {
            key: "max_altitude".to_string(),
            value: SettingValue::Number(120.0),
            kind: SettingKind::Number,
            label: "Max altitude".to_string(),
            description: None,
            options: None,
            is_critical: true,
        };
        assert_eq!(setting(&data), "max_altitude = 120  (Max altitude) !");
    }

    #[test]
    fn event_lines_are_prefixed_with_name() {
        assert_eq!(
            event(&RealtimeEvent::connection(false)),
            "[connection] disconnected"
        );
        let other = RealtimeEvent::Other {
            event: "calibration".to_string(),
            data: json!({"step": 2}),
        };
        assert_eq!(event(&other), r#"[calibration] {"step":2}"#);
    }
}
