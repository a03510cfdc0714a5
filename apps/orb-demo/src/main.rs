use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context as _};
use log::{info, warn};

use framepulse_core::{
    run_loop, BoxedCallback, CallbackConfig, FrameArgs, Priority, Registration, Scheduler,
    SchedulerConfig, ShutdownToken, SystemClock,
};
use framepulse_modules_logging::{ConsoleLogger, ConsoleLoggerConfig};

/// Animated state shared by every orb subsystem.
#[derive(Debug, Default)]
struct OrbState {
    audio_level: f64,
    radius: f64,
    sway: f64,
    gaze: (f64, f64),
    particles: Vec<(f64, f64)>,
    frames_drawn: u64,
}

type Shared = Rc<RefCell<OrbState>>;

#[derive(Debug, Clone)]
struct OrbStartupConfig {
    config_path: Option<PathBuf>,
    max_frames: Option<u64>,
}

impl OrbStartupConfig {
    fn from_env() -> Self {
        let config_path = std::env::args()
            .nth(1)
            .or_else(|| std::env::var("ORB_CONFIG").ok())
            .map(PathBuf::from);

        let max_frames = match std::env::var("ORB_MAX_FRAMES") {
            Ok(v) if v == "0" => None,
            Ok(v) => v.parse::<u64>().ok().or(Some(600)),
            Err(_) => Some(600),
        };

        Self {
            config_path,
            max_frames,
        }
    }

    fn scheduler_config(&self) -> anyhow::Result<SchedulerConfig> {
        if let Some(path) = &self.config_path {
            return Ok(SchedulerConfig::load_toml(path)?);
        }

        Ok(SchedulerConfig {
            log_fps: true,
            callbacks: default_callbacks(),
            ..SchedulerConfig::default()
        })
    }
}

fn default_callbacks() -> Vec<CallbackConfig> {
    let entry = |name: &str, priority: Priority, settings: toml::Value| CallbackConfig {
        name: name.to_string(),
        priority,
        enabled: true,
        settings,
    };
    let table = |pairs: &[(&str, toml::Value)]| {
        toml::Value::Table(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    };

    vec![
        entry("audio-level", Priority::Critical, table(&[])),
        entry("orb-render", Priority::High, table(&[])),
        entry("idle-sway", Priority::Medium, table(&[("speed", toml::Value::Float(0.8))])),
        entry("gaze", Priority::Low, table(&[("fail_every", toml::Value::Integer(240))])),
        entry(
            "ambient-particles",
            Priority::Idle,
            table(&[("count", toml::Value::Integer(48))]),
        ),
        entry("bloom", Priority::Low, table(&[("cost_ms", toml::Value::Integer(14))])),
    ]
}

fn register_factories(scheduler: &mut Scheduler<SystemClock>, state: &Shared) {
    let s = state.clone();
    scheduler.register_factory("audio-level", move |_| {
        let s = s.clone();
        Ok(Box::new(move |args: &FrameArgs<'_>| {
            let t = args.timestamp_ms / 1000.0;
            s.borrow_mut().audio_level = (t * 6.0).sin().abs() * 0.7 + (t * 1.3).cos().abs() * 0.3;
            Ok(())
        }) as BoxedCallback)
    });

    let s = state.clone();
    scheduler.register_factory("orb-render", move |_| {
        let s = s.clone();
        Ok(Box::new(move |_: &FrameArgs<'_>| {
            let mut st = s.borrow_mut();
            st.radius = 1.0 + st.audio_level * 0.25 + st.sway * 0.05;
            st.frames_drawn += 1;
            Ok(())
        }) as BoxedCallback)
    });

    let s = state.clone();
    scheduler.register_factory("idle-sway", move |settings| {
        let speed = settings.get("speed").and_then(|v| v.as_float()).unwrap_or(1.0);
        let s = s.clone();
        Ok(Box::new(move |args: &FrameArgs<'_>| {
            s.borrow_mut().sway = (args.timestamp_ms / 1000.0 * speed).sin();
            Ok(())
        }) as BoxedCallback)
    });

    let s = state.clone();
    scheduler.register_factory("gaze", move |settings| {
        let fail_every = settings
            .get("fail_every")
            .and_then(|v| v.as_integer())
            .and_then(|v| u64::try_from(v).ok())
            .filter(|v| *v > 0);
        let s = s.clone();
        Ok(Box::new(move |args: &FrameArgs<'_>| {
            if let Some(n) = fail_every {
                if args.frame % n == 0 {
                    return Err(anyhow!("gaze tracker lost the face on frame {}", args.frame));
                }
            }
            let t = args.timestamp_ms / 1000.0;
            s.borrow_mut().gaze = ((t * 0.4).cos() * 0.2, (t * 0.3).sin() * 0.1);
            Ok(())
        }) as BoxedCallback)
    });

    let s = state.clone();
    scheduler.register_factory("ambient-particles", move |settings| {
        let count = settings
            .get("count")
            .and_then(|v| v.as_integer())
            .and_then(|v| usize::try_from(v).ok())
            .unwrap_or(32);
        let s = s.clone();
        Ok(Box::new(move |args: &FrameArgs<'_>| {
            let mut st = s.borrow_mut();
            if st.particles.len() != count {
                st.particles = (0..count).map(|i| (i as f64, 0.0)).collect();
            }
            let step = args.delta_ms / 1000.0;
            for (i, p) in st.particles.iter_mut().enumerate() {
                p.1 = (p.1 + step * (1.0 + i as f64 * 0.01)) % 1.0;
            }
            Ok(())
        }) as BoxedCallback)
    });

    // Post-processing pass that is too expensive for a frame; gets quarantined.
    scheduler.register_factory("bloom", move |settings| {
        let cost = settings
            .get("cost_ms")
            .and_then(|v| v.as_integer())
            .and_then(|v| u64::try_from(v).ok())
            .unwrap_or(0);
        Ok(Box::new(move |_: &FrameArgs<'_>| {
            thread::sleep(Duration::from_millis(cost));
            Ok(())
        }) as BoxedCallback)
    });
}

fn main() -> anyhow::Result<()> {
    ConsoleLogger::new(ConsoleLoggerConfig::from_env()).init()?;

    let startup = OrbStartupConfig::from_env();
    let cfg = startup
        .scheduler_config()
        .context("failed to load scheduler config")?;

    let shutdown = ShutdownToken::new();
    {
        let s = shutdown.clone();
        if let Err(e) = ctrlc::set_handler(move || s.request()) {
            warn!("ctrl-c handler not installed: {e}");
        }
    }

    let state: Shared = Rc::default();
    let mut scheduler = Scheduler::with_config(SystemClock::new(), cfg);
    register_factories(&mut scheduler, &state);
    let ids = scheduler.register_configured()?;
    info!("orb-demo: {} callbacks registered", ids.len());

    // Frame watchdog with typed context: reports every few seconds of frames.
    let report_every = (scheduler.target_fps() * 5.0) as u64;
    scheduler.register(
        move |args: &FrameArgs<'_>| {
            let st = args
                .context::<RefCell<OrbState>>()
                .ok_or_else(|| anyhow!("watchdog registered without orb state"))?;
            if report_every > 0 && args.frame % report_every == 0 {
                let st = st.borrow();
                info!(
                    "orb: frame={} radius={:.3} gaze=({:.2}, {:.2}) drawn={}",
                    args.frame, st.radius, st.gaze.0, st.gaze.1, st.frames_drawn
                );
            }
            Ok(())
        },
        Registration::new(Priority::Idle)
            .with_label("watchdog")
            .with_context(state.clone()),
    );

    let ticks = run_loop(&mut scheduler, &shutdown, startup.max_frames);

    println!("{}", serde_json::to_string_pretty(&scheduler.stats())?);
    for id in ids {
        if let Some(cb) = scheduler.callback_stats(id) {
            println!("{}", serde_json::to_string(&cb)?);
        }
    }

    scheduler.destroy();
    info!("orb-demo: exiting after {ticks} ticks");
    Ok(())
}
