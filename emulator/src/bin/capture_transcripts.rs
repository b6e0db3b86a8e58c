//! Replays canned console sessions and stores their transcripts under
//! `transcripts/`.

use std::path::PathBuf;

#[allow(dead_code)]
#[path = "../scene.rs"]
mod scene;
#[allow(dead_code)]
#[path = "../session.rs"]
mod session;

use session::{Session, SessionConfig, SessionError};

struct Profile {
    name: &'static str,
    title: &'static str,
    brightness: u8,
    contexts: usize,
    script: &'static [&'static str],
}

const PROFILES: &[Profile] = &[
    Profile {
        name: "dark-scene",
        title: "Auto exposure converging on a dark scene",
        brightness: 12,
        contexts: 1,
        script: &[
            "set streaming on",
            "get ae_mode",
            "frame 8",
            "history",
            "status",
        ],
    },
    Profile {
        name: "manual-exposure",
        title: "Manual gain and exposure overrides",
        brightness: 128,
        contexts: 1,
        script: &[
            "set ae_mode 1",
            "set ae_gain 0x200",
            "set exposure 10000",
            "frame 3",
            "get ae_gain",
            "set ae_mode 0",
            "frame 6",
            "history",
        ],
    },
    Profile {
        name: "scene-change",
        title: "Scene brightening while streaming",
        brightness: 60,
        contexts: 1,
        script: &[
            "set streaming on",
            "frame 6",
            "scene 220",
            "frame 10",
            "history",
            "cmd 0x0c 0x95",
        ],
    },
    Profile {
        name: "two-contexts",
        title: "Two pipelines with independent settings",
        brightness: 128,
        contexts: 2,
        script: &[
            "context",
            "set brightness 150",
            "context 1",
            "get brightness",
            "frame 2",
            "status",
            "context 2",
        ],
    },
];

fn main() -> Result<(), SessionError> {
    env_logger::init();
    for profile in PROFILES {
        record_profile(profile)?;
    }
    Ok(())
}

fn record_profile(profile: &Profile) -> Result<(), SessionError> {
    let config = SessionConfig {
        brightness: profile.brightness,
        contexts: profile.contexts,
        transcript: Some(PathBuf::from(format!(
            "transcripts/emulator-{}.log",
            profile.name
        ))),
        title: profile.title,
    };
    let mut session = Session::new(&config)?;
    for line in profile.script {
        session.handle_line(line)?;
    }
    log::info!("recorded {}: {}", profile.name, session.summary());
    Ok(())
}
