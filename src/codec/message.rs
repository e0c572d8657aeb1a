//! Message ids and the few messages the hub builds itself

use mavlink::common::{
    MavAutopilot, MavModeFlag, MavSeverity, MavState, MavType, HEARTBEAT_DATA, STATUSTEXT_DATA,
};

pub const MSG_ID_HEARTBEAT: u32 = 0;
pub const MSG_ID_MANUAL_CONTROL: u32 = 69;
pub const MSG_ID_COMMAND_LONG: u32 = 76;
pub const MSG_ID_STATUSTEXT: u32 = 253;

pub const MAV_COMP_ID_AUTOPILOT1: u8 = 1;
pub const MAV_COMP_ID_CAMERA: u8 = 100;

/// Longest text a single STATUSTEXT carries
pub const MAX_STATUS_TEXT: usize = 50;

const MAVLINK_VERSION: u8 = 3;

/// Heartbeat announcing an active generic autopilot
pub fn autopilot_heartbeat(custom_mode: u32) -> HEARTBEAT_DATA {
    HEARTBEAT_DATA {
        custom_mode,
        mavtype: MavType::MAV_TYPE_GENERIC,
        autopilot: MavAutopilot::MAV_AUTOPILOT_GENERIC,
        base_mode: MavModeFlag::empty(),
        system_status: MavState::MAV_STATE_ACTIVE,
        mavlink_version: MAVLINK_VERSION,
    }
}

/// Heartbeat announcing an active camera component
pub fn camera_heartbeat() -> HEARTBEAT_DATA {
    HEARTBEAT_DATA {
        mavtype: MavType::MAV_TYPE_CAMERA,
        autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
        ..autopilot_heartbeat(0)
    }
}

/// Heartbeat a ground station sends
pub fn gcs_heartbeat() -> HEARTBEAT_DATA {
    HEARTBEAT_DATA {
        mavtype: MavType::MAV_TYPE_GCS,
        autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
        ..autopilot_heartbeat(0)
    }
}

/// Single-chunk STATUSTEXT, `None` if `text` is longer than [`MAX_STATUS_TEXT`] bytes
pub fn status_text(severity: MavSeverity, text: &str) -> Option<STATUSTEXT_DATA> {
    let bytes = text.as_bytes();
    if bytes.len() > MAX_STATUS_TEXT {
        return None;
    }

    let mut text_bytes = [0u8; MAX_STATUS_TEXT];
    text_bytes[..bytes.len()].copy_from_slice(bytes);
    Some(STATUSTEXT_DATA {
        severity,
        text: text_bytes.into(),
    })
}
