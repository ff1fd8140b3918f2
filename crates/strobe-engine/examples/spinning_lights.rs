//! Strobe RealtimeEngine: spinning lights in a shared scene.
//!
//! Demonstrates:
//!   1. Starting a RealtimeEngine with a render thread and a worker pool
//!   2. Units that compute on workers and commit scene changes on the
//!      render thread only
//!   3. A timer-armed blinker and a chain of dimmers that always run
//!      back-to-back on one thread
//!   4. Posting an event from the application thread
//!   5. Graceful shutdown and the final scene
//!
//! Run with:
//!   RUST_LOG=strobe_engine=debug cargo run --example spinning_lights

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use strobe_core::{
    ArmingCollection, ArmingCondition, ConditionKind, EventId, FrameId, NoExternalLock, Processor,
    ProcessorError, RenderTarget, UnitFlags,
};
use strobe_engine::{EngineConfig, RealtimeEngine};
use tracing_subscriber::EnvFilter;

// ─── Scene ──────────────────────────────────────────────────────

const LIGHTS: usize = 6;
const FLASH: EventId = EventId(1);

#[derive(Debug, Default)]
struct Scene {
    angles: [f32; LIGHTS],
    brightness: [f32; LIGHTS],
    blink_on: bool,
    flashes: u32,
}

type SharedScene = Arc<Mutex<Scene>>;

// ─── Units ──────────────────────────────────────────────────────

/// Rotates one light. Reads the scene in `compute`, writes it in `commit`.
struct Spinner {
    index: usize,
    speed: f32,
    scene: SharedScene,
    next: f32,
}

impl Processor for Spinner {
    fn name(&self) -> &str {
        "spinner"
    }

    fn initialize(&mut self) -> Option<ArmingCondition> {
        Some(ArmingCondition::NewFrame)
    }

    fn compute(&mut self, _arming: &ArmingCollection) -> Result<(), ProcessorError> {
        let current = self.scene.lock().angles[self.index];
        self.next = (current + self.speed) % 360.0;
        Ok(())
    }

    fn commit(&mut self, _arming: &ArmingCollection) -> Result<(), ProcessorError> {
        self.scene.lock().angles[self.index] = self.next;
        Ok(())
    }
}

/// Toggles the blink state every half second, or immediately on a flash.
struct Blinker {
    scene: SharedScene,
}

impl Processor for Blinker {
    fn name(&self) -> &str {
        "blinker"
    }

    fn initialize(&mut self) -> Option<ArmingCondition> {
        Some(ArmingCondition::any_of([
            ArmingCondition::timer(Duration::from_millis(500)),
            ArmingCondition::post_event([FLASH]),
        ]))
    }

    fn compute(&mut self, _arming: &ArmingCollection) -> Result<(), ProcessorError> {
        Ok(())
    }

    fn commit(&mut self, arming: &ArmingCollection) -> Result<(), ProcessorError> {
        let mut scene = self.scene.lock();
        if arming.fired(ConditionKind::PostEvent) {
            scene.flashes += 1;
        }
        if arming.fired(ConditionKind::TimerExpired) {
            scene.blink_on = !scene.blink_on;
        }
        Ok(())
    }
}

/// Fades one light's brightness towards a target. Dimmers are chained so
/// each one sees the previous dimmer's committed value on the next frame.
struct Dimmer {
    index: usize,
    scene: SharedScene,
    armed: bool,
    next: f32,
}

impl Processor for Dimmer {
    fn name(&self) -> &str {
        "dimmer"
    }

    fn initialize(&mut self) -> Option<ArmingCondition> {
        self.armed.then_some(ArmingCondition::NewFrame)
    }

    fn compute(&mut self, _arming: &ArmingCollection) -> Result<(), ProcessorError> {
        let scene = self.scene.lock();
        let target = if self.index == 0 {
            1.0
        } else {
            scene.brightness[self.index - 1]
        };
        let current = scene.brightness[self.index];
        self.next = current + (target - current) * 0.1;
        Ok(())
    }

    fn commit(&mut self, _arming: &ArmingCollection) -> Result<(), ProcessorError> {
        self.scene.lock().brightness[self.index] = self.next;
        Ok(())
    }
}

// ─── Renderer ───────────────────────────────────────────────────

struct LogRenderer {
    scene: SharedScene,
}

impl RenderTarget for LogRenderer {
    fn render(&mut self, frame: FrameId) {
        if frame.0 % 30 == 0 {
            let scene = self.scene.lock();
            tracing::info!(
                %frame,
                angle0 = scene.angles[0],
                brightness_last = scene.brightness[LIGHTS - 1],
                blink_on = scene.blink_on,
                "render"
            );
        }
    }
}

// ─── Main ───────────────────────────────────────────────────────

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_thread_names(true)
        .init();

    let scene: SharedScene = Arc::new(Mutex::new(Scene::default()));
    let config = EngineConfig {
        worker_count: Some(3),
        target_frame_rate_hz: 60,
        ..EngineConfig::default()
    };
    let mut engine = RealtimeEngine::new(
        config,
        Box::new(LogRenderer {
            scene: Arc::clone(&scene),
        }),
        Arc::new(NoExternalLock),
    )?;
    let scheduler = engine.handle();

    for index in 0..LIGHTS {
        scheduler.register(
            Box::new(Spinner {
                index,
                speed: 1.0 + index as f32,
                scene: Arc::clone(&scene),
                next: 0.0,
            }),
            UnitFlags::default(),
        )?;
    }
    scheduler.register(
        Box::new(Blinker {
            scene: Arc::clone(&scene),
        }),
        UnitFlags::default(),
    )?;

    let mut previous = None;
    for index in 0..LIGHTS {
        let id = scheduler.register(
            Box::new(Dimmer {
                index,
                scene: Arc::clone(&scene),
                armed: index == 0,
                next: 0.0,
            }),
            UnitFlags::default(),
        )?;
        if let Some(prev) = previous {
            scheduler.set_next_in_chain(prev, Some(id))?;
        }
        previous = Some(id);
    }

    for _ in 0..3 {
        thread::sleep(Duration::from_millis(400));
        let woken = scheduler.distribute_post_event(FLASH);
        tracing::info!(woken, "flash posted");
    }
    thread::sleep(Duration::from_millis(400));

    let stats = engine.stats();
    let report = engine.shutdown();
    let scene = scene.lock();
    println!(
        "committed {} frames ({} deferred, {} over budget) in {}ms shutdown",
        stats.frames_committed, stats.deferred_frames, stats.over_budget_frames, report.total_ms
    );
    println!("angles:     {:?}", scene.angles);
    println!("brightness: {:?}", scene.brightness);
    println!("flashes:    {}", scene.flashes);
    Ok(())
}
