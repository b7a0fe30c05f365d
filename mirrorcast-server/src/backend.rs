//! Media backend selection.

use std::sync::Arc;

use tracing::{info, warn};

use mirrorcast_core::{MediaBackend, MirrorError, ReplayBackend, UnavailableBackend};

use crate::config::{BackendConfig, BackendKind};

/// Build the backend named by the configuration.
///
/// `auto` never fails: without a usable GStreamer install the server
/// still runs, and every session fails at configuration.
pub fn select(cfg: &BackendConfig) -> Result<Arc<dyn MediaBackend>, MirrorError> {
    let backend: Arc<dyn MediaBackend> = match cfg.kind {
        BackendKind::Auto => match gstreamer() {
            Ok(backend) => backend,
            Err(e) => {
                warn!("no usable encoder backend: {e}");
                Arc::new(UnavailableBackend)
            }
        },
        BackendKind::Gstreamer => gstreamer()?,
        BackendKind::Replay => {
            if cfg.replay_file.as_os_str().is_empty() {
                return Err(MirrorError::Other(
                    "replay backend needs backend.replay_file".into(),
                ));
            }
            Arc::new(ReplayBackend::from_file(&cfg.replay_file, cfg.replay_fps)?)
        }
        BackendKind::None => Arc::new(UnavailableBackend),
    };
    info!("media backend: {}", backend.name());
    Ok(backend)
}

#[cfg(feature = "gstreamer")]
fn gstreamer() -> Result<Arc<dyn MediaBackend>, MirrorError> {
    Ok(Arc::new(mirrorcast_core::GstBackend::new()?))
}

#[cfg(not(feature = "gstreamer"))]
fn gstreamer() -> Result<Arc<dyn MediaBackend>, MirrorError> {
    Err(MirrorError::BackendUnavailable(
        "built without the `gstreamer` feature",
    ))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn config(kind: BackendKind) -> BackendConfig {
        BackendConfig {
            kind,
            ..BackendConfig::default()
        }
    }

    #[test]
    fn none_selects_unavailable() {
        let backend = select(&config(BackendKind::None)).unwrap();
        assert_eq!(backend.name(), "unavailable");
    }

    #[cfg(not(feature = "gstreamer"))]
    #[test]
    fn auto_falls_back_without_gstreamer() {
        let backend = select(&config(BackendKind::Auto)).unwrap();
        assert_eq!(backend.name(), "unavailable");
        assert!(select(&config(BackendKind::Gstreamer)).is_err());
    }

    #[test]
    fn replay_requires_a_file() {
        assert!(select(&config(BackendKind::Replay)).is_err());

        let missing = BackendConfig {
            kind: BackendKind::Replay,
            replay_file: PathBuf::from("/nonexistent/screen.h264"),
            replay_fps: 60,
        };
        assert!(select(&missing).is_err());
    }

    #[test]
    fn replay_loads_annexb_file() {
        let path = std::env::temp_dir().join(format!("mirrorcast-{}.h264", std::process::id()));
        std::fs::write(&path, [0, 0, 0, 1, 0x67, 0x42, 0, 0, 1, 0x65, 0x88, 0x80]).unwrap();

        let cfg = BackendConfig {
            kind: BackendKind::Replay,
            replay_file: path.clone(),
            replay_fps: 30,
        };
        let backend = select(&cfg).unwrap();
        assert_eq!(backend.name(), "replay");
        assert!(backend.create_encoder().is_ok());

        std::fs::remove_file(path).ok();
    }
}
