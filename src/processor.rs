//! End-to-end compositing processor
//!
//! `CompositeProcessor` runs one request from raw inputs to a finished
//! composite: decode, plate redaction, background removal and composition.
//! The CLI and library entry points both go through it so they behave the
//! same way.

use crate::{
    config::{CompositeConfig, Preset},
    error::{CompositeError, Result},
    pipeline::CompositionPipeline,
    plates::{PlateDetector, PlateRedactor},
    remover::{DefaultRemoverFactory, RemoverFactory, RemoverHandle, RemoverKind},
    services::{ImageIOService, ProcessingStage, ProgressTracker},
    types::{ProcessingOutput, ProcessingTimings},
};
use image::DynamicImage;
use instant::Instant;
use log::{debug, info};
use std::path::Path;
use std::sync::Arc;
use tracing::{info as trace_info, instrument, span, Level};

/// Configuration for the compositing processor
#[derive(Debug, Clone, Default)]
pub struct ProcessorConfig {
    /// Compositing parameters
    pub composite: CompositeConfig,
    /// Background remover to build on first use
    pub remover: RemoverKind,
    /// Enable verbose progress reporting
    pub verbose_progress: bool,
}

impl ProcessorConfig {
    /// Create a new processor configuration builder
    #[must_use]
    pub fn builder() -> ProcessorConfigBuilder {
        ProcessorConfigBuilder::new()
    }
}

/// Builder for `ProcessorConfig`
#[derive(Debug, Default)]
pub struct ProcessorConfigBuilder {
    config: ProcessorConfig,
}

impl ProcessorConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from one of the reference presets
    #[must_use]
    pub fn preset(mut self, preset: Preset) -> Self {
        self.config.composite = CompositeConfig::preset(preset);
        self
    }

    #[must_use]
    pub fn composite(mut self, composite: CompositeConfig) -> Self {
        self.config.composite = composite;
        self
    }

    #[must_use]
    pub fn remover(mut self, remover: RemoverKind) -> Self {
        self.config.remover = remover;
        self
    }

    #[must_use]
    pub fn verbose_progress(mut self, verbose: bool) -> Self {
        self.config.verbose_progress = verbose;
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    /// `CompositeError::InvalidConfig` when the compositing parameters fail
    /// validation.
    pub fn build(self) -> Result<ProcessorConfig> {
        self.config.composite.validate()?;
        Ok(self.config)
    }
}

/// Runs plate redaction, background removal and composition for one request
/// at a time
pub struct CompositeProcessor {
    config: ProcessorConfig,
    remover: Arc<RemoverHandle>,
    redactor: PlateRedactor,
    pipeline: Option<CompositionPipeline>,
    initialized: bool,
    progress_tracker: Option<ProgressTracker>,
}

impl CompositeProcessor {
    /// Create a processor using the built-in removers
    ///
    /// # Errors
    /// Invalid compositing configuration.
    pub fn new(config: ProcessorConfig) -> Result<Self> {
        Self::with_factory(config, Arc::new(DefaultRemoverFactory::new()))
    }

    /// Create a processor with a custom remover factory
    ///
    /// # Errors
    /// Invalid compositing configuration.
    pub fn with_factory(config: ProcessorConfig, factory: Arc<dyn RemoverFactory>) -> Result<Self> {
        let handle = Arc::new(RemoverHandle::new(factory, config.remover));
        Self::with_remover_handle(config, handle)
    }

    /// Create a processor sharing an existing remover handle
    ///
    /// Processors built from the same handle reuse one remover instance.
    ///
    /// # Errors
    /// Invalid compositing configuration.
    pub fn with_remover_handle(config: ProcessorConfig, remover: Arc<RemoverHandle>) -> Result<Self> {
        config.composite.validate()?;
        Ok(Self {
            config,
            remover,
            redactor: PlateRedactor::default(),
            pipeline: None,
            initialized: false,
            progress_tracker: None,
        })
    }

    /// Use `detector` for license-plate redaction
    #[must_use]
    pub fn with_plate_detector(mut self, detector: Box<dyn PlateDetector>) -> Self {
        self.redactor = PlateRedactor::new(detector);
        self
    }

    /// Report stage progress to `tracker`
    #[must_use]
    pub fn with_progress_tracker(mut self, tracker: ProgressTracker) -> Self {
        self.progress_tracker = Some(tracker);
        self
    }

    /// Build the pipeline and load the remover
    ///
    /// Called automatically by the first request.
    ///
    /// # Errors
    /// - Invalid compositing configuration
    /// - Remover creation failures
    pub fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }

        info!("Initializing compositing processor");
        debug!("Remover: {}", self.remover.kind());
        self.report_stage(ProcessingStage::Initialization);

        self.pipeline = Some(CompositionPipeline::new(self.config.composite.clone())?);
        self.remover.get()?;
        self.initialized = true;

        info!("Compositing processor initialized successfully");
        Ok(())
    }

    /// Process a foreground photo and an optional background
    ///
    /// Without a background only the redacted cutout is produced.
    ///
    /// # Errors
    /// - Remover or detector failures
    /// - Placement failures when compositing
    pub fn process_image(
        &mut self,
        foreground: &DynamicImage,
        background: Option<&DynamicImage>,
    ) -> Result<ProcessingOutput> {
        self.begin_request();
        self.run(foreground, background, ProcessingTimings::default(), Instant::now())
    }

    /// Decode and process encoded image bytes
    ///
    /// # Errors
    /// - `CompositeError::InputDecode` for malformed input
    /// - Everything [`CompositeProcessor::process_image`] returns
    pub fn process_bytes(&mut self, foreground: &[u8], background: Option<&[u8]>) -> Result<ProcessingOutput> {
        self.begin_request();
        let total_start = Instant::now();
        let mut timings = ProcessingTimings::default();

        self.report_stage(ProcessingStage::ImageLoading);
        let decode_start = Instant::now();
        let decoded = ImageIOService::load_from_bytes(foreground).and_then(|fg| {
            background
                .map(ImageIOService::load_from_bytes)
                .transpose()
                .map(|bg| (fg, bg))
        });
        let (foreground, background) = self.track(decoded)?;
        timings.image_decode_ms = decode_start.elapsed().as_millis() as u64;

        self.run(&foreground, background.as_ref(), timings, total_start)
    }

    /// Read both streams to the end and process them
    ///
    /// # Errors
    /// - Stream read failures
    /// - Everything [`CompositeProcessor::process_bytes`] returns
    pub async fn process_reader<R, B>(&mut self, foreground: R, background: Option<B>) -> Result<ProcessingOutput>
    where
        R: tokio::io::AsyncRead + Unpin,
        B: tokio::io::AsyncRead + Unpin,
    {
        use tokio::io::AsyncReadExt;

        let mut fg_bytes = Vec::new();
        let mut reader = foreground;
        reader.read_to_end(&mut fg_bytes).await?;

        let bg_bytes = match background {
            Some(mut reader) => {
                let mut buffer = Vec::new();
                reader.read_to_end(&mut buffer).await?;
                Some(buffer)
            },
            None => None,
        };

        self.process_bytes(&fg_bytes, bg_bytes.as_deref())
    }

    /// Load image files and process them
    ///
    /// # Errors
    /// - Missing or unreadable files
    /// - Everything [`CompositeProcessor::process_bytes`] returns
    pub async fn process_file<P: AsRef<Path>>(
        &mut self,
        foreground: P,
        background: Option<&Path>,
    ) -> Result<ProcessingOutput> {
        let fg_path = foreground.as_ref();
        let fg_bytes = tokio::fs::read(fg_path)
            .await
            .map_err(|e| CompositeError::file_io_error("read foreground image", fg_path, &e))?;

        let bg_bytes = match background {
            Some(bg_path) => Some(
                tokio::fs::read(bg_path)
                    .await
                    .map_err(|e| CompositeError::file_io_error("read background image", bg_path, &e))?,
            ),
            None => None,
        };

        self.process_bytes(&fg_bytes, bg_bytes.as_deref())
    }

    /// Save the composite (or the cutout when there is none) to `path`
    ///
    /// The format follows the file extension. Encoding time is recorded in
    /// the output's timings.
    ///
    /// # Errors
    /// - Unsupported extension
    /// - Encoding or write failures
    pub fn save_output<P: AsRef<Path>>(&mut self, output: &mut ProcessingOutput, path: P) -> Result<()> {
        self.report_stage(ProcessingStage::FileSaving);
        let encode_start = Instant::now();
        let image = output
            .composite
            .as_ref()
            .map_or(&output.cutout, |composite| &composite.image);
        let saved = ImageIOService::save_image(image, path.as_ref());
        self.track(saved)?;

        let encode_ms = encode_start.elapsed().as_millis() as u64;
        output.timings.image_encode_ms = Some(encode_ms);
        output.timings.total_ms += encode_ms;
        Ok(())
    }

    #[must_use]
    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Handle shared by this processor, for building sibling processors
    #[must_use]
    pub fn remover_handle(&self) -> Arc<RemoverHandle> {
        Arc::clone(&self.remover)
    }

    #[instrument(
        skip(self, foreground, background, timings, total_start),
        fields(
            remover = %self.config.remover,
            foreground = %format!("{}x{}", foreground.width(), foreground.height()),
            has_background = background.is_some()
        )
    )]
    fn run(
        &mut self,
        foreground: &DynamicImage,
        background: Option<&DynamicImage>,
        mut timings: ProcessingTimings,
        total_start: Instant,
    ) -> Result<ProcessingOutput> {
        if !self.initialized {
            let load_start = Instant::now();
            let initialized = self.initialize();
            self.track(initialized)?;
            timings.remover_load_ms = load_start.elapsed().as_millis() as u64;
        }

        trace_info!(remover = %self.config.remover, "🎯 Starting composite request");

        self.report_stage(ProcessingStage::PlateRedaction);
        let redaction_start = Instant::now();
        let redacted = {
            let _span = span!(Level::DEBUG, "plate_redaction").entered();
            self.redactor.redact(foreground)
        };
        let (redacted, plates) = self.track(redacted)?;
        timings.plate_redaction_ms = redaction_start.elapsed().as_millis() as u64;

        self.report_stage(ProcessingStage::BackgroundRemoval);
        let removal_start = Instant::now();
        let cutout = {
            let _span = span!(Level::INFO, "background_removal", remover = %self.config.remover).entered();
            self.remover
                .get()
                .and_then(|remover| remover.remove(&redacted, self.config.composite.removal_threshold))
        };
        let cutout = self.track(cutout)?;
        let remover_name = self.remover.get()?.name().to_string();
        timings.background_removal_ms = removal_start.elapsed().as_millis() as u64;

        let composite = match background {
            Some(background) => {
                let pipeline = match self.pipeline.take() {
                    Some(pipeline) => pipeline,
                    None => CompositionPipeline::new(self.config.composite.clone())?,
                };
                let composed = pipeline.compose_with_progress(background, &cutout, self.progress_tracker.as_mut());
                self.pipeline = Some(pipeline);
                let composite = self.track(composed)?;
                timings.absorb_composite(&composite.timings);
                Some(composite)
            },
            None => {
                debug!("No background supplied; returning cutout only");
                None
            },
        };

        timings.total_ms = total_start.elapsed().as_millis() as u64;
        self.report_stage(ProcessingStage::Completed);
        if let Some(tracker) = &self.progress_tracker {
            tracker.report_completion(&timings);
        }

        Ok(ProcessingOutput {
            cutout,
            plates,
            composite,
            remover: remover_name,
            timings,
        })
    }

    fn begin_request(&mut self) {
        if let Some(tracker) = self.progress_tracker.as_mut() {
            tracker.reset();
        }
    }

    fn report_stage(&mut self, stage: ProcessingStage) {
        if let Some(tracker) = self.progress_tracker.as_mut() {
            tracker.report_stage(stage);
        }
    }

    /// Forward failures to the progress tracker before propagating them
    fn track<T>(&self, result: Result<T>) -> Result<T> {
        if let (Err(e), Some(tracker)) = (&result, &self.progress_tracker) {
            tracker.report_error(&e.to_string());
        }
        result
    }
}

impl std::fmt::Debug for CompositeProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeProcessor")
            .field("config", &self.config)
            .field("remover", &self.remover)
            .field("initialized", &self.initialized)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plates::{FixedRegionDetector, PlateRegion};
    use crate::remover::{BackgroundRemover, SharedRemover};
    use crate::services::{ProgressReporter, ProgressUpdate};
    use image::{Rgba, RgbaImage};
    use std::sync::Mutex;

    fn foreground() -> DynamicImage {
        let mut rgba = RgbaImage::from_pixel(80, 60, Rgba([0, 0, 0, 0]));
        for y in 15..45 {
            for x in 10..70 {
                rgba.put_pixel(x, y, Rgba([200, 30, 30, 255]));
            }
        }
        DynamicImage::ImageRgba8(rgba)
    }

    fn background() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(160, 120, Rgba([40, 90, 140, 255])))
    }

    fn service_processor() -> CompositeProcessor {
        let config = ProcessorConfig::builder()
            .preset(Preset::Service)
            .build()
            .unwrap();
        CompositeProcessor::new(config).unwrap()
    }

    struct FailingFactory;

    impl RemoverFactory for FailingFactory {
        fn create_remover(&self, _kind: RemoverKind) -> Result<SharedRemover> {
            Err(CompositeError::model_inference("model unavailable"))
        }

        fn available_removers(&self) -> Vec<RemoverKind> {
            Vec::new()
        }
    }

    struct BrokenRemover;

    impl BackgroundRemover for BrokenRemover {
        fn remove(&self, _image: &DynamicImage, _threshold: f32) -> Result<RgbaImage> {
            Err(CompositeError::model_inference("segmentation crashed"))
        }

        fn name(&self) -> &'static str {
            "broken"
        }
    }

    struct StageRecorder(Arc<Mutex<Vec<ProcessingStage>>>, Arc<Mutex<Vec<String>>>);

    impl ProgressReporter for StageRecorder {
        fn report_progress(&self, update: ProgressUpdate) {
            self.0.lock().unwrap().push(update.stage);
        }

        fn report_completion(&self, _timings: &ProcessingTimings) {}

        fn report_error(&self, _stage: ProcessingStage, error: &str) {
            self.1.lock().unwrap().push(error.to_string());
        }
    }

    #[test]
    fn test_lazy_initialization() {
        let mut processor = service_processor();
        assert!(!processor.is_initialized());
        processor.process_image(&foreground(), None).unwrap();
        assert!(processor.is_initialized());
    }

    #[test]
    fn test_cutout_only_without_background() {
        let mut processor = service_processor();
        let output = processor.process_image(&foreground(), None).unwrap();
        assert!(output.composite.is_none());
        assert_eq!(output.cutout.dimensions(), (80, 60));
        assert_eq!(output.cutout.get_pixel(0, 0)[3], 0);
        assert_eq!(output.cutout.get_pixel(40, 30)[3], 255);
        assert_eq!(output.remover, "alpha");
    }

    #[test]
    fn test_composite_with_background() {
        let mut processor = service_processor();
        let output = processor.process_image(&foreground(), Some(&background())).unwrap();
        let composite = output.composite.unwrap();
        // The service flow resizes the background to the photo
        assert_eq!(composite.dimensions(), (80, 60));
        // floor(0.95 * 60) = 57 tall, 80 * 57 / 60 = 76 wide
        assert_eq!(composite.plan.target_height, 57);
        assert_eq!(composite.plan.target_width, 76);
    }

    #[test]
    fn test_plates_are_reported() {
        let config = ProcessorConfig::builder()
            .preset(Preset::Service)
            .build()
            .unwrap();
        let mut processor = CompositeProcessor::new(config)
            .unwrap()
            .with_plate_detector(Box::new(FixedRegionDetector::new(vec![PlateRegion::new(30, 35, 20, 8)])));
        let output = processor.process_image(&foreground(), None).unwrap();
        assert_eq!(output.plates, vec![PlateRegion::new(30, 35, 20, 8)]);
        assert_eq!(output.report().plates_blurred, 1);
    }

    #[test]
    fn test_process_bytes_rejects_garbage() {
        let mut processor = service_processor();
        let err = processor.process_bytes(b"not an image", None).unwrap_err();
        assert!(matches!(err, CompositeError::InputDecode(_)));
    }

    #[test]
    fn test_remover_failure_is_fatal() {
        let mut processor = CompositeProcessor::with_factory(ProcessorConfig::default(), Arc::new(FailingFactory)).unwrap();
        let err = processor.process_image(&foreground(), Some(&background())).unwrap_err();
        assert!(matches!(err, CompositeError::ModelInference(_)));
        assert!(!processor.is_initialized());
    }

    #[test]
    fn test_removal_error_reported_to_tracker() {
        let stages = Arc::new(Mutex::new(Vec::new()));
        let errors = Arc::new(Mutex::new(Vec::new()));
        let handle = Arc::new(RemoverHandle::ready(Arc::new(BrokenRemover)));
        let mut processor = CompositeProcessor::with_remover_handle(ProcessorConfig::default(), handle)
            .unwrap()
            .with_progress_tracker(ProgressTracker::new(Box::new(StageRecorder(stages.clone(), errors.clone()))));

        assert!(processor.process_image(&foreground(), None).is_err());
        assert_eq!(stages.lock().unwrap().last(), Some(&ProcessingStage::BackgroundRemoval));
        assert!(errors.lock().unwrap()[0].contains("segmentation crashed"));
    }

    #[test]
    fn test_shared_handle_between_processors() {
        let first = service_processor();
        let handle = first.remover_handle();
        let mut second = CompositeProcessor::with_remover_handle(first.config().clone(), Arc::clone(&handle)).unwrap();
        second.process_image(&foreground(), None).unwrap();
        assert!(handle.is_loaded());
    }

    #[test]
    fn test_save_output_records_encode_time() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("composite.png");
        let mut processor = service_processor();
        let mut output = processor.process_image(&foreground(), Some(&background())).unwrap();
        processor.save_output(&mut output, &path).unwrap();
        assert!(path.exists());
        assert!(output.timings.image_encode_ms.is_some());
    }

    #[tokio::test]
    async fn test_process_reader() {
        let fg = ImageIOService::encode_png(&foreground().to_rgba8()).unwrap();
        let bg = ImageIOService::encode_png(&background().to_rgba8()).unwrap();
        let mut processor = service_processor();
        let output = processor
            .process_reader(std::io::Cursor::new(fg), Some(std::io::Cursor::new(bg)))
            .await
            .unwrap();
        assert!(output.composite.is_some());
    }
}
