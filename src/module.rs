//! Plugin module load/unload and source registration

use crate::network::transport;
use crate::runtime::{InitOutcome, ShutdownOutcome};
use crate::settings::{ModuleConfig, SourceSettings};
use crate::source::{SourceInfo, VideoSource};
use crate::telemetry::{init_logging, LogGuard};
use crate::video::decoder;

/// Runtime outcomes reported by [`PluginModule::load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    pub transport: InitOutcome,
    pub codec: InitOutcome,
}

/// Runtime outcomes reported by [`PluginModule::unload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnloadReport {
    pub transport: ShutdownOutcome,
    pub codec: ShutdownOutcome,
}

/// The loaded module: its configuration, runtimes and registered sources.
///
/// `E` is the host's draw context type.
pub struct PluginModule<E> {
    config: ModuleConfig,
    sources: Vec<SourceInfo<E>>,
    report: LoadReport,
    _log_guard: Option<LogGuard>,
}

impl<E> PluginModule<E> {
    /// Set up logging and the process-wide runtimes.
    pub fn load(config: ModuleConfig) -> Self {
        let log_guard = match init_logging(&config.log) {
            Ok(guard) => guard,
            Err(e) => {
                // The host may already own the global subscriber
                tracing::debug!("Keeping existing logger: {}", e);
                None
            }
        };

        let report = LoadReport {
            transport: transport::initialize(),
            codec: decoder::initialize(config.codec_limits),
        };

        tracing::info!(
            "Pipe source module loaded ({} named channels)",
            config.channels.entries.len()
        );

        Self {
            config,
            sources: Vec::new(),
            report,
            _log_guard: log_guard,
        }
    }

    /// Shut the process-wide runtimes down.
    ///
    /// Sources created afterwards still work but can no longer bind.
    pub fn unload(&mut self) -> UnloadReport {
        let report = UnloadReport {
            transport: transport::shutdown(),
            codec: decoder::shutdown(),
        };
        tracing::info!("Pipe source module unloaded");
        report
    }

    pub fn register(&mut self, info: SourceInfo<E>) {
        if self.sources.iter().any(|s| s.id == info.id) {
            tracing::warn!("Source '{}' is already registered; replacing it", info.id);
            self.sources.retain(|s| s.id != info.id);
        }
        tracing::info!("Registered source '{}' ({})", info.id, info.display_name);
        self.sources.push(info);
    }

    pub fn source(&self, id: &str) -> Option<&SourceInfo<E>> {
        self.sources.iter().find(|s| s.id == id)
    }

    pub fn sources(&self) -> &[SourceInfo<E>] {
        &self.sources
    }

    /// Instantiate the registered source `id`.
    pub fn create_source(
        &self,
        id: &str,
        settings: &SourceSettings,
    ) -> Option<Box<dyn VideoSource<Effect = E>>> {
        let Some(info) = self.source(id) else {
            tracing::warn!("No source registered as '{}'", id);
            return None;
        };
        Some(info.create(settings))
    }

    pub fn config(&self) -> &ModuleConfig {
        &self.config
    }

    pub fn load_report(&self) -> LoadReport {
        self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::recording::RecordingGraphics;
    use crate::network::scripted::ScriptedSubscriber;
    use crate::source::{pipe_source_info, PIPE_SOURCE_ID};

    // Unloading shuts down runtimes shared with every test in this binary;
    // it is covered by the `module_unload` integration test instead.

    #[test]
    fn test_load_initializes_runtimes() {
        let module = PluginModule::<()>::load(ModuleConfig::default());
        assert!(transport::is_active());

        let second = PluginModule::<()>::load(ModuleConfig::default());
        assert_eq!(second.load_report().transport, InitOutcome::AlreadyInitialized);
        assert_eq!(second.load_report().codec, InitOutcome::AlreadyInitialized);
        assert!(module.sources().is_empty());
    }

    #[test]
    fn test_register_and_create() {
        let mut module = PluginModule::load(ModuleConfig::default());
        module.register(pipe_source_info(
            ScriptedSubscriber::default,
            RecordingGraphics::default,
        ));
        module.register(pipe_source_info(
            ScriptedSubscriber::default,
            RecordingGraphics::default,
        ));
        assert_eq!(module.sources().len(), 1);

        let info = module.source(PIPE_SOURCE_ID).unwrap();
        assert_eq!(info.display_name, "Pipe Source");

        let settings = SourceSettings {
            channel_name: "stage".to_string(),
            ..Default::default()
        };
        let mut source = module.create_source(PIPE_SOURCE_ID, &settings).unwrap();
        source.video_tick(0.016);
        source.video_render(&());
        assert_eq!(source.width(), 0);

        assert!(module.create_source("missing", &settings).is_none());
    }
}
