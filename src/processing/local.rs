//! Local processing: runs the enabled chain modules over a decoded buffer.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::engine::backend::PcmBuffer;
use crate::error::{ProcessingError, ProcessingOrigin};

use super::module::{ModuleKind, ParamValue, ProcessingModule};

/// Transform applied to PCM for one module kind.
///
/// Implementations mutate the buffer in place and read their settings from
/// the module's parameters.
pub trait AudioTransform: Send + Sync {
    fn apply(&self, module: &ProcessingModule, buffer: &mut PcmBuffer)
        -> Result<(), ProcessingError>;
}

/// Linear gain stage driven by the `gain_db` parameter.
pub struct GainTransform;

impl GainTransform {
    pub const PARAM: &'static str = "gain_db";
    const MIN_DB: f64 = -60.0;
    const MAX_DB: f64 = 24.0;
}

impl AudioTransform for GainTransform {
    fn apply(
        &self,
        module: &ProcessingModule,
        buffer: &mut PcmBuffer,
    ) -> Result<(), ProcessingError> {
        let gain_db = match module.parameters.get(Self::PARAM) {
            Some(ParamValue::Number(value)) if value.is_finite() => *value,
            Some(other) => {
                return Err(ProcessingError::invalid_options(
                    ProcessingOrigin::Local,
                    format!("module {}: {} must be a number, got {:?}", module.id, Self::PARAM, other),
                ))
            }
            None => {
                return Err(ProcessingError::invalid_options(
                    ProcessingOrigin::Local,
                    format!("module {}: missing {}", module.id, Self::PARAM),
                ))
            }
        };

        let gain = 10f64.powf(gain_db.clamp(Self::MIN_DB, Self::MAX_DB) / 20.0) as f32;
        for sample in buffer.samples.iter_mut() {
            *sample *= gain;
        }
        Ok(())
    }
}

/// Output of a local run.
#[derive(Debug, Clone)]
pub struct LocalRun {
    pub buffer: PcmBuffer,
    pub modules_applied: Vec<String>,
}

/// Runs chain snapshots against the transform registry.
///
/// Module kinds with no registered transform pass audio through unchanged.
pub struct LocalProcessor {
    transforms: RwLock<HashMap<ModuleKind, Arc<dyn AudioTransform>>>,
}

impl LocalProcessor {
    /// Processor with the built-in transforms registered.
    pub fn new() -> Self {
        let processor = Self {
            transforms: RwLock::new(HashMap::new()),
        };
        processor.register(ModuleKind::Gain, Arc::new(GainTransform));
        processor
    }

    /// Register (or replace) the transform for a module kind.
    pub fn register(&self, kind: ModuleKind, transform: Arc<dyn AudioTransform>) {
        self.transforms
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind, transform);
    }

    pub fn has_transform(&self, kind: ModuleKind) -> bool {
        self.transforms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&kind)
    }

    pub fn run(
        &self,
        input: &PcmBuffer,
        modules: &[ProcessingModule],
    ) -> Result<LocalRun, ProcessingError> {
        let mut buffer = input.clone();
        let mut modules_applied = Vec::new();

        for module in modules.iter().filter(|module| module.enabled) {
            let transform = self
                .transforms
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&module.kind)
                .cloned();
            match transform {
                Some(transform) => {
                    transform.apply(module, &mut buffer)?;
                    modules_applied.push(module.id.clone());
                }
                None => {
                    log::debug!(
                        "[LocalProcessor] No transform for {:?} ({}); passing through",
                        module.kind,
                        module.id
                    );
                }
            }
        }

        Ok(LocalRun {
            buffer,
            modules_applied,
        })
    }
}

impl Default for LocalProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProcessingErrorKind;

    fn buffer() -> PcmBuffer {
        PcmBuffer {
            samples: vec![0.5, -0.5, 0.25, -0.25],
            channels: 2,
            sample_rate: 44_100,
        }
    }

    #[test]
    fn test_gain_applies_in_chain_order() {
        let processor = LocalProcessor::new();
        let modules = vec![
            ProcessingModule::new(ModuleKind::Gain)
                .with_id("cut")
                .with_param(GainTransform::PARAM, -6.0),
            ProcessingModule::new(ModuleKind::Reverb).with_id("verb"),
            ProcessingModule::new(ModuleKind::Gain)
                .with_id("boost")
                .with_param(GainTransform::PARAM, 6.0),
        ];

        let run = processor.run(&buffer(), &modules).unwrap();
        assert_eq!(run.modules_applied, vec!["cut", "boost"]);
        for (out, original) in run.buffer.samples.iter().zip(buffer().samples) {
            assert!((out - original).abs() < 1e-5);
        }
    }

    #[test]
    fn test_disabled_module_is_skipped() {
        let processor = LocalProcessor::new();
        let mut module = ProcessingModule::new(ModuleKind::Gain)
            .with_id("g")
            .with_param(GainTransform::PARAM, 20.0);
        module.enabled = false;

        let run = processor.run(&buffer(), &[module]).unwrap();
        assert!(run.modules_applied.is_empty());
        assert_eq!(run.buffer.samples, buffer().samples);
    }

    #[test]
    fn test_gain_without_parameter_is_invalid() {
        let processor = LocalProcessor::new();
        let module = ProcessingModule::new(ModuleKind::Gain).with_id("g");

        let err = processor.run(&buffer(), &[module]).unwrap_err();
        assert_eq!(err.origin, ProcessingOrigin::Local);
        assert!(matches!(err.kind, ProcessingErrorKind::InvalidOptions { .. }));
    }

    #[test]
    fn test_registered_transform_replaces_pass_through() {
        struct Silence;
        impl AudioTransform for Silence {
            fn apply(
                &self,
                _module: &ProcessingModule,
                buffer: &mut PcmBuffer,
            ) -> Result<(), ProcessingError> {
                buffer.samples.iter_mut().for_each(|s| *s = 0.0);
                Ok(())
            }
        }

        let processor = LocalProcessor::new();
        assert!(!processor.has_transform(ModuleKind::NoiseGate));
        processor.register(ModuleKind::NoiseGate, Arc::new(Silence));

        let run = processor
            .run(&buffer(), &[ProcessingModule::new(ModuleKind::NoiseGate).with_id("gate")])
            .unwrap();
        assert_eq!(run.buffer.peak(), 0.0);
    }
}
