//! Console keywords: the commands, the named parameters and the symbolic values.
//!
//! The parser and the `help` output both read these tables so the accepted
//! words and the documented ones cannot drift apart.

use crate::command::ids::{
    ACTIVE_CONTEXT, AE_COMPENSATION, AE_EXPOSURE, AE_GAIN, AE_MODE, AE_STATE, AF_LENS_STATUS,
    AF_MANUAL_CONTROL, AF_MODE, AF_STATE, AWB_MODE, AWB_STATE, AWB_TEMPERATURE,
    BRIGHTNESS_STRENGTH, CALIBRATION_UPDATE, COLOR_MODE, CONTEXT_NUMBER, CONTRAST_STRENGTH,
    DISABLE, ENABLE, FW_REVISION, HUE_THETA, NOISE_REDUCTION_MODE, OFF, ON, ORIENTATION_VFLIP,
    RUN, SATURATION_STRENGTH, SENSOR_FPS, SENSOR_HEIGHT, SENSOR_PRESET, SENSOR_STREAMING,
    SENSOR_SUPPORTED_PRESETS, SENSOR_WIDTH, SHARPENING_STRENGTH, STATUS_INFO_EXPOSURE_LOG2,
    STATUS_INFO_GAIN_LOG2, STATUS_INFO_GAIN_ONES, SYSTEM_ANTI_FLICKER_FREQUENCY,
    SYSTEM_ANTIFLICKER_ENABLE, SYSTEM_DYNAMIC_GAMMA_ENABLE, SYSTEM_EXPOSURE,
    SYSTEM_EXPOSURE_PRIORITY, SYSTEM_FREEZE_FIRMWARE, SYSTEM_INTEGRATION_TIME, SYSTEM_ISO_GAIN,
    SYSTEM_ISP_DIGITAL_GAIN, SYSTEM_LOGGER_LEVEL, SYSTEM_LOGGER_MASK, SYSTEM_MANUAL_AWB,
    SYSTEM_MANUAL_EXPOSURE, SYSTEM_MANUAL_INTEGRATION_TIME, SYSTEM_MANUAL_SENSOR_ANALOG_GAIN,
    SYSTEM_SATURATION_TARGET, SYSTEM_SENSOR_ANALOG_GAIN, SYSTEM_SENSOR_DIGITAL_GAIN, TALGORITHMS,
    TEST_PATTERN_ENABLE, TEST_PATTERN_MODE, TGENERAL, TIMAGE, TSCENE_MODES, TSELFTEST, TSENSOR,
    TSTATUS, TSYSTEM, UPDATE,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandTag {
    Get,
    Set,
    Cmd,
    Frame,
    Status,
    History,
    Context,
    Help,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub tag: CommandTag,
    pub usage: &'static str,
    pub summary: &'static str,
}

/// A command id reachable by name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: u8,
    pub id: u8,
}

const COMMANDS: [CommandSpec; 8] = [
    CommandSpec {
        name: "get",
        tag: CommandTag::Get,
        usage: "get <param>",
        summary: "read a named parameter of the active context",
    },
    CommandSpec {
        name: "set",
        tag: CommandTag::Set,
        usage: "set <param> <value>",
        summary: "write a named parameter of the active context",
    },
    CommandSpec {
        name: "cmd",
        tag: CommandTag::Cmd,
        usage: "cmd <type> <id> [value]",
        summary: "raw command; reads without a value, writes with one",
    },
    CommandSpec {
        name: "frame",
        tag: CommandTag::Frame,
        usage: "frame [count]",
        summary: "run frames through the active context",
    },
    CommandSpec {
        name: "status",
        tag: CommandTag::Status,
        usage: "status",
        summary: "context, frame and exposure summary",
    },
    CommandSpec {
        name: "history",
        tag: CommandTag::History,
        usage: "history",
        summary: "exposure of the recent frames",
    },
    CommandSpec {
        name: "context",
        tag: CommandTag::Context,
        usage: "context [index]",
        summary: "show or select the active context",
    },
    CommandSpec {
        name: "help",
        tag: CommandTag::Help,
        usage: "help [command|params]",
        summary: "list commands, or describe one",
    },
];

const fn param(name: &'static str, kind: u8, id: u8) -> ParamSpec {
    ParamSpec { name, kind, id }
}

const PARAMS: [ParamSpec; 53] = [
    param("contexts", TGENERAL, CONTEXT_NUMBER),
    param("active_context", TGENERAL, ACTIVE_CONTEXT),
    param("revision", TSELFTEST, FW_REVISION),
    param("streaming", TSENSOR, SENSOR_STREAMING),
    param("presets", TSENSOR, SENSOR_SUPPORTED_PRESETS),
    param("preset", TSENSOR, SENSOR_PRESET),
    param("fps", TSENSOR, SENSOR_FPS),
    param("width", TSENSOR, SENSOR_WIDTH),
    param("height", TSENSOR, SENSOR_HEIGHT),
    param("log_level", TSYSTEM, SYSTEM_LOGGER_LEVEL),
    param("log_mask", TSYSTEM, SYSTEM_LOGGER_MASK),
    param("test_pattern", TSYSTEM, TEST_PATTERN_ENABLE),
    param("test_pattern_mode", TSYSTEM, TEST_PATTERN_MODE),
    param("freeze", TSYSTEM, SYSTEM_FREEZE_FIRMWARE),
    param("manual_exposure", TSYSTEM, SYSTEM_MANUAL_EXPOSURE),
    param("manual_integration_time", TSYSTEM, SYSTEM_MANUAL_INTEGRATION_TIME),
    param("manual_analog_gain", TSYSTEM, SYSTEM_MANUAL_SENSOR_ANALOG_GAIN),
    param("manual_awb", TSYSTEM, SYSTEM_MANUAL_AWB),
    param("exposure", TSYSTEM, SYSTEM_EXPOSURE),
    param("integration_time", TSYSTEM, SYSTEM_INTEGRATION_TIME),
    param("analog_gain", TSYSTEM, SYSTEM_SENSOR_ANALOG_GAIN),
    param("digital_gain", TSYSTEM, SYSTEM_SENSOR_DIGITAL_GAIN),
    param("isp_gain", TSYSTEM, SYSTEM_ISP_DIGITAL_GAIN),
    param("saturation_target", TSYSTEM, SYSTEM_SATURATION_TARGET),
    param("antiflicker", TSYSTEM, SYSTEM_ANTIFLICKER_ENABLE),
    param("antiflicker_hz", TSYSTEM, SYSTEM_ANTI_FLICKER_FREQUENCY),
    param("dynamic_gamma", TSYSTEM, SYSTEM_DYNAMIC_GAMMA_ENABLE),
    param("calibration_update", TSYSTEM, CALIBRATION_UPDATE),
    param("exposure_priority", TSYSTEM, SYSTEM_EXPOSURE_PRIORITY),
    param("iso_gain", TSYSTEM, SYSTEM_ISO_GAIN),
    param("exposure_log2", TSTATUS, STATUS_INFO_EXPOSURE_LOG2),
    param("gain_log2", TSTATUS, STATUS_INFO_GAIN_LOG2),
    param("gain", TSTATUS, STATUS_INFO_GAIN_ONES),
    param("vflip", TIMAGE, ORIENTATION_VFLIP),
    param("lens", TALGORITHMS, AF_LENS_STATUS),
    param("af_mode", TALGORITHMS, AF_MODE),
    param("af_state", TALGORITHMS, AF_STATE),
    param("af_position", TALGORITHMS, AF_MANUAL_CONTROL),
    param("ae_mode", TALGORITHMS, AE_MODE),
    param("ae_state", TALGORITHMS, AE_STATE),
    param("ae_gain", TALGORITHMS, AE_GAIN),
    param("ae_exposure", TALGORITHMS, AE_EXPOSURE),
    param("ae_compensation", TALGORITHMS, AE_COMPENSATION),
    param("awb_mode", TALGORITHMS, AWB_MODE),
    param("awb_state", TALGORITHMS, AWB_STATE),
    param("awb_temperature", TALGORITHMS, AWB_TEMPERATURE),
    param("noise_reduction", TALGORITHMS, NOISE_REDUCTION_MODE),
    param("color_mode", TSCENE_MODES, COLOR_MODE),
    param("brightness", TSCENE_MODES, BRIGHTNESS_STRENGTH),
    param("contrast", TSCENE_MODES, CONTRAST_STRENGTH),
    param("saturation", TSCENE_MODES, SATURATION_STRENGTH),
    param("sharpening", TSCENE_MODES, SHARPENING_STRENGTH),
    param("hue", TSCENE_MODES, HUE_THETA),
];

const VALUES: [(&str, u32); 6] = [
    ("on", ON),
    ("off", OFF),
    ("enable", ENABLE),
    ("disable", DISABLE),
    ("run", RUN),
    ("update", UPDATE),
];

#[must_use]
pub const fn commands() -> &'static [CommandSpec] {
    &COMMANDS
}

#[must_use]
pub const fn params() -> &'static [ParamSpec] {
    &PARAMS
}

/// Finds a command by name, ignoring ASCII case.
#[must_use]
pub fn find(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS
        .iter()
        .find(|spec| spec.name.eq_ignore_ascii_case(name))
}

#[must_use]
pub fn find_param(name: &str) -> Option<&'static ParamSpec> {
    PARAMS
        .iter()
        .find(|spec| spec.name.eq_ignore_ascii_case(name))
}

/// Symbolic value such as `on` or `disable`.
#[must_use]
pub fn value(word: &str) -> Option<u32> {
    VALUES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(word))
        .map(|&(_, value)| value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_unique() {
        for (index, spec) in PARAMS.iter().enumerate() {
            assert!(
                PARAMS[index + 1..].iter().all(|other| other.name != spec.name),
                "duplicate parameter {}",
                spec.name
            );
        }
        for (index, spec) in COMMANDS.iter().enumerate() {
            assert!(COMMANDS[index + 1..].iter().all(|other| other.name != spec.name));
        }
    }

    #[test]
    fn lookups_ignore_case() {
        assert_eq!(find("HeLp").map(|spec| spec.tag), Some(CommandTag::Help));
        assert_eq!(
            find_param("AE_MODE").map(|spec| (spec.kind, spec.id)),
            Some((TALGORITHMS, AE_MODE))
        );
        assert_eq!(value("On"), Some(ON));
        assert_eq!(value("maybe"), None);
    }
}
