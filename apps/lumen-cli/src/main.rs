use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lumen_persist::{
    DEFAULT_NAMESPACE, FileStorage, MemoryStorage, Preset, SessionPersistence, SessionStorage,
    storage_key,
};
use lumen_render::{RecordingBackend, ResourceKind};
use lumen_scene::{Session, SessionConfig, schema::LIGHTS};
use lumen_state::{ManualClock, Path, Persistence};
use lumen_tools::StoreInspector;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lumen-cli", about = "Inspect and drive lumen settings sessions")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Session storage directory; without it storage lives in memory
    #[arg(long, global = true)]
    session_dir: Option<PathBuf>,

    /// Settings namespace
    #[arg(long, global = true, default_value = DEFAULT_NAMESPACE)]
    namespace: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and store summary
    Info,
    /// Print the stored settings as `path = value` lines
    Dump {
        /// Print the raw JSON instead
        #[arg(long)]
        json: bool,
    },
    /// List the available presets
    Presets,
    /// Replace the stored settings with a preset
    Preset {
        /// Preset name, case-insensitive
        name: String,
    },
    /// Forget the stored settings
    Reset,
    /// Run the scene headless against a recording backend
    Simulate {
        /// Number of frame callbacks
        #[arg(short, long, default_value = "120")]
        frames: u32,
        /// Wall time between callbacks, in milliseconds
        #[arg(long, default_value = "16.0")]
        frame_ms: f64,
        /// Resize the lights list before running
        #[arg(long)]
        lights: Option<usize>,
    },
}

fn storage(session_dir: Option<&PathBuf>) -> Result<Rc<dyn SessionStorage>> {
    Ok(match session_dir {
        Some(dir) => Rc::new(
            FileStorage::open(dir)
                .with_context(|| format!("open session storage at {}", dir.display()))?,
        ),
        None => Rc::new(MemoryStorage::new()),
    })
}

fn mount(persistence: &SessionPersistence, namespace: &str) -> Session<RecordingBackend> {
    Session::mount(
        persistence.clone(),
        Rc::new(ManualClock::new()),
        RecordingBackend::new(),
        SessionConfig {
            namespace: namespace.to_owned(),
            ..SessionConfig::default()
        },
    )
}

fn resize_lights(session: &Session<RecordingBackend>, target: usize) -> Result<()> {
    let list = session
        .panel()
        .list(&Path::root().child(LIGHTS))
        .context("lights list is not mounted")?;
    while list.len() < target && list.increment() {}
    while list.len() > target && list.decrement() {}
    if list.len() != target {
        println!(
            "lights clamped to {} (bounds {}..={})",
            list.len(),
            list.bounds().min,
            list.bounds().max
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let persistence = SessionPersistence::new(storage(cli.session_dir.as_ref())?);
    let namespace = cli.namespace.as_str();

    match cli.command {
        Commands::Info => {
            println!("lumen-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("storage key: {}", storage_key(namespace));
            let stored = persistence.read(namespace)?;
            println!("stored: {}", if stored.is_some() { "yes" } else { "no" });
            let session = mount(&persistence, namespace);
            println!("{}", StoreInspector::summary(session.store()));
            let manager = session.manager().borrow();
            println!(
                "scene: phase={} lights={} skybox={}",
                manager.phase().name(),
                manager.settings().light_count(),
                manager.settings().mesh.skybox_texture
            );
        }
        Commands::Dump { json } => match persistence.read(namespace)? {
            None => println!("nothing stored for {namespace}"),
            Some(snapshot) if json => println!("{}", serde_json::to_string_pretty(&snapshot)?),
            Some(snapshot) => {
                for entry in lumen_tools::flatten(&snapshot) {
                    println!("{entry}");
                }
            }
        },
        Commands::Presets => {
            for preset in Preset::ALL {
                println!("{:<36} {}", preset.name(), preset.label());
            }
        }
        Commands::Preset { name } => {
            let preset: Preset = name.parse()?;
            preset.write(&persistence, namespace)?;
            println!("{} written to {}", preset.label(), storage_key(namespace));
        }
        Commands::Reset => {
            persistence.clear(namespace);
            println!("{} cleared", storage_key(namespace));
        }
        Commands::Simulate {
            frames,
            frame_ms,
            lights,
        } => {
            let mut session = mount(&persistence, namespace);
            if let Some(target) = lights {
                resize_lights(&session, target)?;
            }
            let elapsed = Duration::from_secs_f64(frame_ms.max(0.0) / 1000.0);
            info!(frames, frame_ms, "simulating");
            let mut updates = 0u64;
            let mut rendered = 0u32;
            for _ in 0..frames {
                let report = session.frame(elapsed);
                updates += u64::from(report.updates);
                rendered += 1;
                if !report.running {
                    break;
                }
            }
            let manager = session.manager().borrow();
            println!(
                "callbacks={rendered} updates={updates} phase={}",
                manager.phase().name()
            );
            if let Some(e) = manager.error() {
                println!("halted: {e} ({:#06x})", e.code());
            }
            let backend = manager.backend();
            for kind in ResourceKind::ALL {
                println!(
                    "{:<8} live={} created={} released={}",
                    kind.name(),
                    backend.live(kind),
                    backend.created(kind),
                    backend.released(kind)
                );
            }
            println!("frames={} draws={}", backend.frames(), backend.draws());
        }
    }

    Ok(())
}
