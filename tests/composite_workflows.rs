//! End-to-end compositing workflows
//!
//! Exercises the processor and pipeline the way the CLI and library entry
//! points use them: real encoded inputs, files on disk and async readers.

use image::{DynamicImage, GrayImage, Luma, Rgba, RgbaImage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use vehicle_composite::{
    composite_from_readers, AlphaPassthroughRemover, CompositeConfig, CompositeProcessor,
    CompositionPipeline, DefaultRemoverFactory, FixedRegionDetector, ImageIOService, PlateRegion,
    Preset, ProcessingStage, ProcessingTimings, ProcessorConfig, ProgressReporter,
    ProgressTracker, ProgressUpdate, ReflectionSynthesizer, RemoverFactory, RemoverHandle,
    RemoverKind, Result, SharedRemover,
};

const BACKGROUND: Rgba<u8> = Rgba([90, 90, 90, 255]);

fn solid(width: u32, height: u32, color: Rgba<u8>) -> RgbaImage {
    RgbaImage::from_pixel(width, height, color)
}

/// Red block on transparency, like a cutout produced upstream
fn car_photo(width: u32, height: u32) -> RgbaImage {
    let mut image = RgbaImage::new(width, height);
    for y in height / 4..height * 3 / 4 {
        for x in width / 8..width * 7 / 8 {
            image.put_pixel(x, y, Rgba([200, 20, 20, 255]));
        }
    }
    image
}

fn checker(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        if (x / 2 + y / 2) % 2 == 0 {
            Rgba([255, 255, 255, 255])
        } else {
            Rgba([0, 0, 0, 255])
        }
    })
}

fn service_processor() -> CompositeProcessor {
    let config = ProcessorConfig::builder().preset(Preset::Service).build().unwrap();
    CompositeProcessor::new(config).unwrap()
}

#[test]
fn test_reference_scenario_placement() {
    let config = CompositeConfig::builder()
        .apply_color_enhancement(false)
        .build()
        .unwrap();
    let pipeline = CompositionPipeline::new(config.clone()).unwrap();

    let result = pipeline
        .compose(
            &DynamicImage::ImageRgba8(solid(800, 600, BACKGROUND)),
            &solid(400, 300, Rgba([255, 0, 0, 255])),
        )
        .unwrap();

    assert_eq!(result.dimensions(), (800, 600));
    assert_eq!(result.plan.target_width, 640);
    assert_eq!(result.plan.target_height, 480);
    assert_eq!(result.plan.paste_x, 80);
    assert_eq!(result.plan.paste_y, 72);

    let band = ReflectionSynthesizer::new(config.reflection).band_height(result.plan.target_height);
    assert_eq!(band, 288);

    // Lower part of the subject, below the reflection band
    let subject = result.image.get_pixel(400, 520);
    assert!(subject[0] > 250 && subject[1] < 5 && subject[2] < 5, "{:?}", subject);

    // Untouched background far from every layer
    assert_eq!(*result.image.get_pixel(5, 5), BACKGROUND);
    assert_eq!(*result.image.get_pixel(795, 595), BACKGROUND);
}

#[test]
fn test_shadow_stays_inside_subject_frame() {
    let config = CompositeConfig::builder()
        .apply_color_enhancement(false)
        .reflection_height_ratio(0.0)
        .build()
        .unwrap();
    let pipeline = CompositionPipeline::new(config).unwrap();

    // Opaque block in the middle of a transparent 400x300 cutout
    let mut cutout = RgbaImage::new(400, 300);
    for y in 75..225 {
        for x in 50..350 {
            cutout.put_pixel(x, y, Rgba([255, 0, 0, 255]));
        }
    }
    let result = pipeline
        .compose(&DynamicImage::ImageRgba8(solid(800, 600, BACKGROUND)), &cutout)
        .unwrap();

    // Block ends near row 432; the blurred shadow shows just beneath it
    let ground = result.image.get_pixel(400, 440);
    assert!(ground[0] < BACKGROUND[0], "{:?}", ground);

    // Nothing is drawn below the subject frame, which ends at row 552
    let bottom = result.plan.paste_y + i64::from(result.plan.target_height);
    assert_eq!(bottom, 552);
    for y in 552..560 {
        assert_eq!(*result.image.get_pixel(400, y), BACKGROUND, "row {}", y);
    }
}

#[test]
fn test_composite_png_roundtrip() {
    let mut processor = service_processor();
    let output = processor
        .process_image(
            &DynamicImage::ImageRgba8(car_photo(120, 80)),
            Some(&DynamicImage::ImageRgba8(solid(240, 160, BACKGROUND))),
        )
        .unwrap();
    let composite = output.composite.unwrap();

    let bytes = composite.to_png_bytes().unwrap();
    let decoded = ImageIOService::load_from_bytes(&bytes).unwrap().to_rgba8();
    assert_eq!(decoded, composite.image);
}

#[test]
fn test_presets_place_differently() {
    let foreground = DynamicImage::ImageRgba8(car_photo(120, 80));
    let background = DynamicImage::ImageRgba8(solid(240, 160, BACKGROUND));

    let mut service = service_processor();
    let mut interactive = CompositeProcessor::new(ProcessorConfig::default()).unwrap();

    let service_composite = service
        .process_image(&foreground, Some(&background))
        .unwrap()
        .composite
        .unwrap();
    let service_plan = service_composite.plan;
    let interactive_plan = interactive
        .process_image(&foreground, Some(&background))
        .unwrap()
        .composite
        .unwrap()
        .plan;

    // Service resizes the background to the 120x80 photo
    assert_eq!(service_composite.image.dimensions(), (120, 80));
    // 0.95 of 80 rows and 0.8 of 160 rows
    assert_eq!(service_plan.target_height, 76);
    assert_eq!(interactive_plan.target_height, 128);
    // Service nudges up, interactive nudges down
    assert_eq!(service_plan.paste_y, (80 - 76) / 2 - 1);
    assert_eq!(interactive_plan.paste_y, (160 - 128) / 2 + 3);
}

#[test]
fn test_service_composites_wide_photo_on_narrow_background() {
    let mut photo = RgbaImage::new(1600, 600);
    for y in 200..500 {
        for x in 100..1500 {
            photo.put_pixel(x, y, Rgba([200, 20, 20, 255]));
        }
    }

    let mut processor = service_processor();
    let output = processor
        .process_image(
            &DynamicImage::ImageRgba8(photo),
            Some(&DynamicImage::ImageRgba8(solid(800, 600, BACKGROUND))),
        )
        .unwrap();
    let composite = output.composite.unwrap();

    assert_eq!(composite.dimensions(), (1600, 600));
    assert_eq!(composite.plan.target_height, 570);
    assert_eq!(composite.plan.target_width, 1520);
    assert_eq!(composite.plan.paste_x, 40);
    // Wide, axis-aligned silhouette reads as a side view at 90 degrees
    assert_eq!(composite.estimate.orientation, vehicle_composite::Orientation::Side);
    assert_eq!(composite.plan.reflection_offset, 150);
}

#[test]
fn test_plate_blur_only_touches_regions() {
    let photo = checker(60, 40);
    let region = PlateRegion::new(20, 10, 16, 8);
    let mut processor = service_processor()
        .with_plate_detector(Box::new(FixedRegionDetector::new(vec![region])));

    let output = processor
        .process_image(&DynamicImage::ImageRgba8(photo.clone()), None)
        .unwrap();
    assert_eq!(output.plates, vec![region]);

    let mut changed_inside = false;
    for (x, y, pixel) in output.cutout.enumerate_pixels() {
        let original = photo.get_pixel(x, y);
        if region.contains(x, y) {
            changed_inside |= pixel != original;
        } else {
            assert_eq!(pixel, original, "pixel ({}, {}) changed outside the plate", x, y);
        }
    }
    assert!(changed_inside);
}

#[test]
fn test_plate_region_clipped_to_image() {
    let mut processor = service_processor()
        .with_plate_detector(Box::new(FixedRegionDetector::new(vec![PlateRegion::new(50, 30, 100, 100)])));
    let output = processor
        .process_image(&DynamicImage::ImageRgba8(checker(60, 40)), None)
        .unwrap();
    assert_eq!(output.plates, vec![PlateRegion::new(50, 30, 10, 10)]);
}

#[test]
fn test_chroma_key_workflow() {
    let mut photo = solid(60, 40, Rgba([0, 255, 0, 255]));
    for y in 10..30 {
        for x in 10..50 {
            photo.put_pixel(x, y, Rgba([220, 30, 30, 255]));
        }
    }

    let config = ProcessorConfig::builder()
        .preset(Preset::Service)
        .remover(RemoverKind::Chroma)
        .build()
        .unwrap();
    let mut processor = CompositeProcessor::new(config).unwrap();
    let output = processor
        .process_image(
            &DynamicImage::ImageRgba8(photo),
            Some(&DynamicImage::ImageRgba8(solid(120, 80, BACKGROUND))),
        )
        .unwrap();

    assert_eq!(output.remover, "chroma");
    assert_eq!(output.cutout.get_pixel(2, 2)[3], 0);
    assert_eq!(output.cutout.get_pixel(30, 20)[3], 255);
    assert!(output.composite.is_some());
}

#[test]
fn test_mask_remover_workflow() {
    let mask = GrayImage::from_fn(30, 20, |x, _| if x < 15 { Luma([255]) } else { Luma([0]) });
    let factory = DefaultRemoverFactory::new().with_mask(mask);
    let config = ProcessorConfig::builder().remover(RemoverKind::Mask).build().unwrap();
    let mut processor = CompositeProcessor::with_factory(config, Arc::new(factory)).unwrap();

    // Mask is half the photo's size and gets resized
    let output = processor
        .process_image(&DynamicImage::ImageRgba8(solid(60, 40, Rgba([10, 20, 30, 255]))), None)
        .unwrap();
    assert_eq!(output.cutout.get_pixel(5, 20)[3], 255);
    assert_eq!(output.cutout.get_pixel(55, 20)[3], 0);
}

#[test]
fn test_file_workflow_and_report() {
    let temp_dir = TempDir::new().unwrap();
    let fg_path = temp_dir.path().join("car.png");
    let bg_path = temp_dir.path().join("showroom.jpg");
    let out_path = temp_dir.path().join("out").join("composite.png");

    ImageIOService::save_image(&car_photo(120, 80), &fg_path).unwrap();
    ImageIOService::save_image(&solid(240, 160, BACKGROUND), &bg_path).unwrap();

    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut processor = service_processor();
    let mut output = runtime
        .block_on(processor.process_file(&fg_path, Some(bg_path.as_path())))
        .unwrap();
    processor.save_output(&mut output, &out_path).unwrap();

    // Service output takes the foreground photo's size
    let saved = ImageIOService::load_image(&out_path).unwrap();
    assert_eq!((saved.width(), saved.height()), (120, 80));

    let report = output.report();
    assert_eq!(report.width, 120);
    assert_eq!(report.remover.as_deref(), Some("alpha"));
    assert!(report.timings.image_encode_ms.is_some());

    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert!(json.get("car_angle").is_some());
    assert!(json.get("car_orientation").is_some());
    assert_eq!(json["plan"]["target_height"], 76);
}

#[tokio::test]
async fn test_composite_from_file_readers() {
    let temp_dir = TempDir::new().unwrap();
    let fg_path = temp_dir.path().join("car.png");
    let bg_path = temp_dir.path().join("bg.png");
    ImageIOService::save_image(&car_photo(60, 40), &fg_path).unwrap();
    ImageIOService::save_image(&solid(120, 80, BACKGROUND), &bg_path).unwrap();

    let foreground = tokio::fs::File::open(&fg_path).await.unwrap();
    let background = tokio::fs::File::open(&bg_path).await.unwrap();
    let result = composite_from_readers(foreground, background, &ProcessorConfig::default())
        .await
        .unwrap();
    assert_eq!(result.dimensions(), (120, 80));
}

struct CountingFactory(AtomicUsize);

impl RemoverFactory for CountingFactory {
    fn create_remover(&self, _kind: RemoverKind) -> Result<SharedRemover> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(AlphaPassthroughRemover))
    }

    fn available_removers(&self) -> Vec<RemoverKind> {
        vec![RemoverKind::Alpha]
    }
}

#[test]
fn test_remover_loaded_once_across_processors() {
    let factory = Arc::new(CountingFactory(AtomicUsize::new(0)));
    let handle = Arc::new(RemoverHandle::new(factory.clone(), RemoverKind::Alpha));
    let foreground = DynamicImage::ImageRgba8(car_photo(40, 30));

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let handle = Arc::clone(&handle);
            let foreground = foreground.clone();
            std::thread::spawn(move || {
                let mut processor = CompositeProcessor::with_remover_handle(ProcessorConfig::default(), handle).unwrap();
                processor.process_image(&foreground, None).unwrap();
                processor.process_image(&foreground, None).unwrap();
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(factory.0.load(Ordering::SeqCst), 1);
}

struct StageLog(Arc<Mutex<Vec<ProcessingStage>>>);

impl ProgressReporter for StageLog {
    fn report_progress(&self, update: ProgressUpdate) {
        self.0.lock().unwrap().push(update.stage);
    }

    fn report_completion(&self, _timings: &ProcessingTimings) {}

    fn report_error(&self, _stage: ProcessingStage, _error: &str) {}
}

#[test]
fn test_stage_sequence_for_full_request() {
    let stages = Arc::new(Mutex::new(Vec::new()));
    let mut processor = CompositeProcessor::new(ProcessorConfig::default())
        .unwrap()
        .with_progress_tracker(ProgressTracker::new(Box::new(StageLog(stages.clone()))));

    processor
        .process_image(
            &DynamicImage::ImageRgba8(car_photo(60, 40)),
            Some(&DynamicImage::ImageRgba8(solid(120, 80, BACKGROUND))),
        )
        .unwrap();

    assert_eq!(
        *stages.lock().unwrap(),
        vec![
            ProcessingStage::Initialization,
            ProcessingStage::PlateRedaction,
            ProcessingStage::BackgroundRemoval,
            ProcessingStage::SubjectFitting,
            ProcessingStage::SilhouetteAnalysis,
            ProcessingStage::Placement,
            ProcessingStage::LayerSynthesis,
            ProcessingStage::Compositing,
            ProcessingStage::ColorEnhancement,
            ProcessingStage::Completed,
        ]
    );
}
