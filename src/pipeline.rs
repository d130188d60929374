//! Layer composition of a cutout onto a background
//!
//! The pipeline owns a validated [`CompositeConfig`] and turns a
//! `(background, cutout)` pair into a finished composite:
//!
//! 1. Fit the background canvas ([`BackgroundFit`])
//! 2. Letterbox the cutout onto that canvas when `center_subject` is set
//! 3. Estimate the subject's pose from its silhouette
//! 4. Plan scale, position and reflection offset
//! 5. Render the shadow and reflection from the resized subject
//! 6. Stack background, shadow, subject and reflection
//! 7. Optionally enhance saturation and contrast
//!
//! Any failing stage aborts the whole composite.

use crate::alpha::{overlay_layer, to_rgba};
use crate::config::{BackgroundFit, CompositeConfig};
use crate::enhance;
use crate::error::{CompositeError, Result};
use crate::placement::{PlacementPlan, PlacementPlanner};
use crate::reflection::ReflectionSynthesizer;
use crate::services::{ProcessingStage, ProgressTracker};
use crate::shadow::ShadowSynthesizer;
use crate::silhouette::SilhouetteAnalyzer;
use crate::types::{CompositeResult, ProcessingTimings};
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbaImage};
use instant::Instant;
use tracing::{debug, info, instrument, span, Level};

/// Composites cutouts onto backgrounds using one configuration
#[derive(Debug, Clone)]
pub struct CompositionPipeline {
    config: CompositeConfig,
    analyzer: SilhouetteAnalyzer,
    planner: PlacementPlanner,
    shadow: ShadowSynthesizer,
    reflection: ReflectionSynthesizer,
}

impl CompositionPipeline {
    /// Create a pipeline, validating the configuration first
    ///
    /// # Errors
    /// `CompositeError::InvalidConfig` when the configuration fails validation.
    pub fn new(config: CompositeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            analyzer: SilhouetteAnalyzer::new(),
            planner: PlacementPlanner::new(
                config.subject_height_ratio,
                config.vertical_bias,
                config.vertical_bias_ratio,
                config.offset_table.clone(),
            ),
            shadow: ShadowSynthesizer::new(config.shadow.clone()),
            reflection: ReflectionSynthesizer::new(config.reflection.clone()),
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &CompositeConfig {
        &self.config
    }

    /// Composite `cutout` onto `background`
    ///
    /// The result has the fitted background's dimensions.
    ///
    /// # Errors
    /// - `PlacementOutOfRange` when the subject cannot be placed
    /// - Buffer errors from layer synthesis
    pub fn compose(&self, background: &DynamicImage, cutout: &RgbaImage) -> Result<CompositeResult> {
        self.compose_with_progress(background, cutout, None)
    }

    /// [`CompositionPipeline::compose`], reporting each stage to `tracker`
    ///
    /// # Errors
    /// Same as [`CompositionPipeline::compose`].
    #[instrument(
        skip(self, background, cutout, tracker),
        fields(
            background = %format!("{}x{}", background.width(), background.height()),
            cutout = %format!("{}x{}", cutout.width(), cutout.height())
        )
    )]
    pub fn compose_with_progress(
        &self,
        background: &DynamicImage,
        cutout: &RgbaImage,
        mut tracker: Option<&mut ProgressTracker>,
    ) -> Result<CompositeResult> {
        let total_start = Instant::now();
        let mut timings = ProcessingTimings::default();

        let canvas = fit_background(background, cutout.dimensions(), self.config.background_fit);
        let canvas_size = canvas.dimensions();
        if canvas_size.0 == 0 || canvas_size.1 == 0 {
            return Err(CompositeError::placement("background has empty dimensions"));
        }

        let analysis_start = Instant::now();
        let (subject, estimate) = {
            let _span = span!(Level::DEBUG, "analysis", center_subject = self.config.center_subject).entered();
            report(&mut tracker, ProcessingStage::SubjectFitting);
            let subject = if self.config.center_subject {
                resize_and_center(cutout, canvas_size, self.config.resize_sharpness)
            } else {
                cutout.clone()
            };
            report(&mut tracker, ProcessingStage::SilhouetteAnalysis);
            let estimate = self.analyzer.analyze(&subject);
            (subject, estimate)
        };
        report(&mut tracker, ProcessingStage::Placement);
        let plan = self.planner.plan(subject.dimensions(), canvas_size, &estimate)?;
        timings.analysis_ms = analysis_start.elapsed().as_millis() as u64;

        let synthesis_start = Instant::now();
        let (resized, shadow, reflection) = {
            let _span = span!(
                Level::DEBUG,
                "layer_synthesis",
                target_width = plan.target_width,
                target_height = plan.target_height
            )
            .entered();
            report(&mut tracker, ProcessingStage::LayerSynthesis);
            let resized = imageops::resize(&subject, plan.target_width, plan.target_height, FilterType::Lanczos3);
            let shadow = self.shadow.synthesize(&resized)?;
            let reflection = self.reflection.synthesize(&resized)?;
            (resized, shadow, reflection)
        };
        timings.layer_synthesis_ms = synthesis_start.elapsed().as_millis() as u64;

        let compositing_start = Instant::now();
        let image = {
            let _span = span!(Level::DEBUG, "compositing").entered();
            report(&mut tracker, ProcessingStage::Compositing);
            let mut image = canvas;
            self.stack_layers(&mut image, &resized, &shadow, reflection.as_ref(), &plan);
            if self.config.apply_color_enhancement {
                report(&mut tracker, ProcessingStage::ColorEnhancement);
                image = enhance::apply(&image, &self.config.enhancement);
            }
            image
        };
        timings.compositing_ms = compositing_start.elapsed().as_millis() as u64;
        timings.total_ms = total_start.elapsed().as_millis() as u64;

        info!(
            angle = estimate.angle,
            orientation = %estimate.orientation,
            paste_x = plan.paste_x,
            paste_y = plan.paste_y,
            reflection_y = plan.reflection_y,
            total_ms = timings.total_ms,
            "🚗 Composite complete"
        );

        Ok(CompositeResult {
            image,
            cutout: subject,
            estimate,
            plan,
            timings,
        })
    }

    /// Stack shadow, subject and reflection onto `canvas`
    ///
    /// The shadow is offset inside a canvas the size of the subject, so rows
    /// pushed below the subject's bottom edge are dropped.
    fn stack_layers(
        &self,
        canvas: &mut RgbaImage,
        subject: &RgbaImage,
        shadow: &RgbaImage,
        reflection: Option<&RgbaImage>,
        plan: &PlacementPlan,
    ) {
        let mut grounded = RgbaImage::new(subject.width(), subject.height());
        overlay_layer(&mut grounded, shadow, 0, self.config.shadow.offset_y);
        overlay_layer(canvas, &grounded, plan.paste_x, plan.paste_y);
        overlay_layer(canvas, subject, plan.paste_x, plan.paste_y);
        if let Some(reflection) = reflection {
            overlay_layer(canvas, reflection, plan.paste_x, plan.reflection_y);
        }
    }
}

fn report(tracker: &mut Option<&mut ProgressTracker>, stage: ProcessingStage) {
    if let Some(tracker) = tracker.as_deref_mut() {
        tracker.report_stage(stage);
    }
}

/// Background canvas as RGBA, resized to `subject_size` for [`BackgroundFit::MatchSubject`]
#[must_use]
pub fn fit_background(background: &DynamicImage, subject_size: (u32, u32), fit: BackgroundFit) -> RgbaImage {
    let rgba = to_rgba(background);
    match fit {
        BackgroundFit::Keep => rgba,
        BackgroundFit::MatchSubject if rgba.dimensions() == subject_size => rgba,
        BackgroundFit::MatchSubject => {
            debug!(
                from = %format!("{}x{}", rgba.width(), rgba.height()),
                to = %format!("{}x{}", subject_size.0, subject_size.1),
                "🖼️ Resizing background to subject"
            );
            imageops::resize(&rgba, subject_size.0, subject_size.1, FilterType::Lanczos3)
        },
    }
}

/// Scale `cutout` to fit inside `target_size` and center it on a transparent canvas
///
/// The aspect ratio is kept, the resize is bicubic and the result is
/// sharpened by `sharpness` before pasting.
#[must_use]
pub fn resize_and_center(cutout: &RgbaImage, target_size: (u32, u32), sharpness: f32) -> RgbaImage {
    let (target_w, target_h) = target_size;
    let mut canvas = RgbaImage::new(target_w, target_h);
    let (width, height) = cutout.dimensions();
    if width == 0 || height == 0 || target_w == 0 || target_h == 0 {
        return canvas;
    }

    let scale = (f64::from(target_w) / f64::from(width)).min(f64::from(target_h) / f64::from(height));
    let new_w = ((f64::from(width) * scale) as u32).clamp(1, target_w);
    let new_h = ((f64::from(height) * scale) as u32).clamp(1, target_h);

    let resized = imageops::resize(cutout, new_w, new_h, FilterType::CatmullRom);
    let sharpened = enhance::adjust_sharpness(&resized, sharpness);

    let x = i64::from((target_w - new_w) / 2);
    let y = i64::from((target_h - new_h) / 2);
    imageops::replace(&mut canvas, &sharpened, x, y);
    canvas
}
