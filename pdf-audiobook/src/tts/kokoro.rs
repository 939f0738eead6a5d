//! Kokoro TTS backend using PyO3 to embed Python.
//!
//! Kokoro-82M is a small pretrained model that runs comfortably on CPU. The
//! `KPipeline` for each language is loaded once and reused for every chunk;
//! model weights are fetched and cached by the Python package itself.

use super::{SpeechSynthesizer, SynthesisError, SynthesisOptions, Waveform};
use crate::bootstrap;
use anyhow::Result;
use async_trait::async_trait;
use pyo3::prelude::*;
use pyo3::types::PyDict;
use std::path::PathBuf;
use std::sync::{Arc, Once};

/// Kokoro always produces 24 kHz mono audio.
pub const SAMPLE_RATE: u32 = 24_000;

/// Initialize Python runtime once.
static PYTHON_INIT: Once = Once::new();

/// The bootstrapped Python home, when the environment does not name one yet.
///
/// The interpreter reads `PYTHONHOME` as it starts, so `main` relaunches the
/// binary with the variable set rather than changing its own environment.
pub fn missing_python_home() -> Option<PathBuf> {
    if std::env::var_os("PYTHONHOME").is_some() {
        return None;
    }
    bootstrap::python::get_python_home()
        .ok()
        .filter(|home| home.exists())
}

/// Kokoro TTS backend using PyO3.
pub struct KokoroBackend {
    runtime: Arc<KokoroRuntime>,
}

/// State shared with blocking synthesis tasks.
struct KokoroRuntime {
    /// Torch device (cpu, cuda, mps)
    device: String,
    /// Loaded pipelines keyed by language code; only touched with the GIL held
    pipelines: Py<PyDict>,
}

impl KokoroBackend {
    /// Create a new Kokoro backend.
    ///
    /// Fails with an actionable message when the Python environment has not
    /// been set up.
    pub fn new(device: &str) -> Result<Self> {
        if !bootstrap::python::is_venv_ready()? {
            anyhow::bail!(
                "Python virtual environment not ready. Please run 'pdf2audio setup' first."
            );
        }

        if !bootstrap::python::is_kokoro_installed()? {
            anyhow::bail!("Kokoro not installed. Please run 'pdf2audio setup' first.");
        }

        PYTHON_INIT.call_once(|| {
            let site_packages = bootstrap::python::get_venv_site_packages()
                .ok()
                .filter(|p| p.exists());

            pyo3::prepare_freethreaded_python();

            if let Some(site_packages) = site_packages {
                let result = Python::with_gil(|py| -> PyResult<()> {
                    let sys = py.import("sys")?;
                    let path = sys.getattr("path")?;
                    path.call_method1("insert", (0, site_packages.to_string_lossy().as_ref()))?;
                    Ok(())
                });
                if let Err(e) = result {
                    log::warn!("Could not add venv to sys.path: {}", e);
                }
            }
        });

        let pipelines = Python::with_gil(|py| PyDict::new(py).unbind());

        Ok(Self {
            runtime: Arc::new(KokoroRuntime {
                device: device.to_string(),
                pipelines,
            }),
        })
    }
}

impl KokoroRuntime {
    /// Get the pipeline for a language, loading it on first use.
    fn pipeline<'py>(&self, py: Python<'py>, lang_code: char) -> PyResult<Bound<'py, PyAny>> {
        let cache = self.pipelines.bind(py);
        let key = lang_code.to_string();

        if let Some(pipeline) = cache.get_item(key.as_str())? {
            return Ok(pipeline);
        }

        log::info!("Loading Kokoro pipeline (lang '{}', device {})", key, self.device);
        let kokoro = py.import("kokoro")?;
        let kwargs = PyDict::new(py);
        kwargs.set_item("lang_code", key.as_str())?;
        kwargs.set_item("device", self.device.as_str())?;
        let pipeline = kokoro.getattr("KPipeline")?.call((), Some(&kwargs))?;

        cache.set_item(key.as_str(), &pipeline)?;
        Ok(pipeline)
    }

    /// Run the pipeline and concatenate every audio segment it yields.
    fn generate(
        &self,
        text: &str,
        options: &SynthesisOptions,
    ) -> std::result::Result<Waveform, SynthesisError> {
        Python::with_gil(|py| -> std::result::Result<Waveform, SynthesisError> {
            let pipeline = self.pipeline(py, options.voice.lang_code())?;

            let kwargs = PyDict::new(py);
            kwargs.set_item("voice", options.voice.id())?;
            kwargs.set_item("speed", options.speed)?;
            let results = pipeline.call((text,), Some(&kwargs))?;

            let mut samples: Vec<f32> = Vec::new();
            for result in results.try_iter()? {
                let result = result?;
                let output = result.getattr("output")?;
                if output.is_none() {
                    continue;
                }
                let audio = output.getattr("audio")?;
                if audio.is_none() {
                    continue;
                }

                let segment: Vec<f32> = audio
                    .call_method0("cpu")?
                    .call_method0("numpy")?
                    .call_method0("tolist")?
                    .extract()?;
                samples.extend(segment);
            }

            self.cleanup_memory(py)?;

            if samples.is_empty() {
                return Err(SynthesisError::NoAudio);
            }
            Ok(Waveform::new(samples, SAMPLE_RATE))
        })
    }

    /// Release accelerator memory between chunks.
    fn cleanup_memory(&self, py: Python<'_>) -> PyResult<()> {
        if self.device == "cpu" {
            return Ok(());
        }

        py.import("gc")?.call_method0("collect")?;

        let torch = py.import("torch")?;
        let module = if self.device == "mps" { "mps" } else { "cuda" };
        let backend = torch.getattr(module)?;
        if backend.hasattr("empty_cache")? {
            backend.call_method0("empty_cache")?;
        }

        Ok(())
    }
}

impl From<PyErr> for SynthesisError {
    fn from(err: PyErr) -> Self {
        SynthesisError::Backend(err.to_string())
    }
}

#[async_trait]
impl SpeechSynthesizer for KokoroBackend {
    async fn synthesize(
        &self,
        text: &str,
        options: &SynthesisOptions,
    ) -> std::result::Result<Waveform, SynthesisError> {
        if text.trim().is_empty() {
            return Err(SynthesisError::EmptyText);
        }

        let runtime = Arc::clone(&self.runtime);
        let text = text.to_string();
        let options = options.clone();

        // Run in a blocking task to not block the tokio runtime
        tokio::task::spawn_blocking(move || runtime.generate(&text, &options))
            .await
            .map_err(|e| SynthesisError::Backend(format!("synthesis task failed: {e}")))?
    }

    fn name(&self) -> &'static str {
        "kokoro"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kokoro_backend_creation_without_venv() {
        // Either succeeds (venv exists) or fails with a setup message
        match KokoroBackend::new("cpu") {
            Ok(_) => (),
            Err(e) => {
                let msg = e.to_string();
                assert!(
                    msg.contains("setup") || msg.contains("venv"),
                    "Error should mention setup: {}",
                    msg
                );
            }
        }
    }

    #[test]
    fn test_missing_python_home_is_an_existing_dir() {
        if let Some(home) = missing_python_home() {
            assert!(home.exists());
            assert!(std::env::var_os("PYTHONHOME").is_none());
        }
    }

    #[tokio::test]
    #[ignore = "requires the Kokoro model and its Python environment"]
    async fn test_synthesis_is_deterministic() {
        let backend = KokoroBackend::new("cpu").unwrap();
        let options = SynthesisOptions::default();
        let text = "The quick brown fox jumps over the lazy dog.";

        let first = backend.synthesize(text, &options).await.unwrap();
        let second = backend.synthesize(text, &options).await.unwrap();

        assert_eq!(first.sample_rate, SAMPLE_RATE);
        assert_eq!(first.samples.len(), second.samples.len());
        let max_diff = first
            .samples
            .iter()
            .zip(&second.samples)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f32, f32::max);
        assert!(max_diff < 1e-4, "waveforms differ by {}", max_diff);
    }

    #[tokio::test]
    async fn test_empty_text_is_rejected_before_python() {
        let Ok(backend) = KokoroBackend::new("cpu") else {
            return;
        };
        let err = backend
            .synthesize("   ", &SynthesisOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SynthesisError::EmptyText));
    }
}
