//! iscad entrypoint: batch evaluation of model scripts and geometry files.

mod config;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Once;

use anyhow::Result;
use cad_cache::FeatureCache;
use cad_graph::features::import::Import;
use cad_graph::{cache_handle, FeatureExt};
use cad_model::Model;
use clap::Parser;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "iscad", version, about = "Parametric CAD model evaluator")]
struct Args {
    /// Input file: an .iscad script, any geometry file, or `-` for a script
    /// on stdin. Opens empty when omitted.
    pub input_file: Option<PathBuf>,
    /// Evaluate the model without starting a GUI; exit code reports success.
    #[arg(short = 'b', long = "batch")]
    pub batch: bool,
    /// Put debug output on the console instead of the log file.
    #[arg(short = 'l', long = "nolog")]
    pub nolog: bool,
    /// Deactivate incremental background parsing (GUI concern; recorded
    /// only).
    #[arg(short = 'g', long = "nobgparse")]
    pub nobgparse: bool,
    /// Configuration file path (overrides discovery of `iscad.toml`).
    #[arg(long = "config")]
    pub config: Option<PathBuf>,
}

struct AppStartup {
    log_guard: Option<WorkerGuard>,
}

impl AppStartup {
    fn new() -> Self {
        Self { log_guard: None }
    }

    fn configure_logging(&mut self, to_console: bool) {
        let filter = tracing_subscriber::EnvFilter::from_default_env();
        if to_console {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init();
        } else {
            let file_appender = tracing_appender::rolling::never(".", "iscad.log");
            let (nb_writer, guard) = tracing_appender::non_blocking(file_appender);
            match tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(nb_writer)
                .try_init()
            {
                Ok(_) => self.log_guard = Some(guard),
                Err(_) => {
                    // Global subscriber already installed; drop the guard so
                    // the writer shuts down.
                }
            }
        }
    }

    fn install_panic_hook() {
        static HOOK: Once = Once::new();
        HOOK.call_once(|| {
            let default_panic = std::panic::take_hook();
            std::panic::set_hook(Box::new(move |info| {
                tracing::error!(target: "runtime.panic", ?info, "panic");
                default_panic(info);
            }));
        });
    }

    fn install_cache(cfg: &config::Config) -> Result<()> {
        let cache = FeatureCache::new(cfg.file.cache.directory.clone())?;
        info!(
            target: "runtime",
            cache_dir = %cache.directory().display(),
            persistent = cfg.file.cache.directory.is_some(),
            "cache_installed"
        );
        cache_handle::install(Rc::new(cache));
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputKind {
    Stdin,
    Script,
    Geometry,
}

fn classify_input(path: &Path) -> InputKind {
    if path.as_os_str() == "-" {
        return InputKind::Stdin;
    }
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("iscad") => InputKind::Script,
        _ => InputKind::Geometry,
    }
}

/// Evaluate one input in batch mode: build the model and run every
/// postprocessing action it declares.
fn run_batch(input: &Path, cfg: &config::Config) -> Result<(), cad_base::CadError> {
    let model = match classify_input(input) {
        InputKind::Stdin => {
            // Drain stdin so the caller is not left blocked on a pipe.
            let mut source = String::new();
            let _ = std::io::stdin().read_to_string(&mut source);
            return Err(cad_base::CadError::invalid(
                "script",
                "no script compiler is registered in this build",
            ));
        }
        InputKind::Script => {
            return Err(cad_base::CadError::invalid(
                input.display().to_string(),
                "no script compiler is registered in this build",
            ));
        }
        InputKind::Geometry => {
            let model = Model::new("model");
            model.add_component("model", Import::create(input));
            model
        }
    };

    cache_handle::init_rebuild();
    for name in model.modelstep_symbols()? {
        let feature = model.lookup_modelstep(&name)?;
        feature.ensure_built()?;
        info!(
            target: "runtime.batch",
            step = %name,
            volume = feature.model_volume().unwrap_or(0.0),
            "model_step_built"
        );
    }
    for name in model.postproc_action_symbols()? {
        let action = model.lookup_postproc_action(&name)?;
        info!(target: "runtime.batch", action = %name, "executing");
        action.execute()?;
    }
    if !cfg.file.cache.keep_unused {
        let evicted = cache_handle::finish_rebuild();
        info!(target: "runtime.batch", evicted, "rebuild_finished");
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut startup = AppStartup::new();
    startup.configure_logging(args.nolog);
    AppStartup::install_panic_hook();
    info!(
        target: "runtime",
        batch = args.batch,
        nobgparse = args.nobgparse,
        "startup"
    );

    let cfg = config::load_from(args.config.clone())?;
    info!(
        target: "config",
        stl_coefficient = cfg.file.export.stl_coefficient,
        keep_unused_cache = cfg.file.cache.keep_unused,
        "config_effective"
    );
    AppStartup::install_cache(&cfg)?;

    match (&args.input_file, args.batch) {
        (Some(input), true) => match run_batch(input, &cfg) {
            Ok(()) => {
                info!(target: "runtime", "batch_done");
                Ok(())
            }
            Err(e) => {
                error!(target: "runtime", error = %e, "batch_failed");
                eprintln!("iscad: {e}");
                std::process::exit(-1);
            }
        },
        (None, true) => {
            eprintln!("iscad: batch mode requires an input file");
            std::process::exit(-1);
        }
        (_, false) => {
            // The interactive front-end is a separate collaborator and not
            // part of this build.
            eprintln!("iscad: GUI front-end not available; run with --batch");
            std::process::exit(-1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stdin_marker_and_script_extension_are_classified() {
        assert_eq!(classify_input(Path::new("-")), InputKind::Stdin);
        assert_eq!(classify_input(Path::new("part.iscad")), InputKind::Script);
        assert_eq!(classify_input(Path::new("part.ISCAD")), InputKind::Script);
        assert_eq!(classify_input(Path::new("part.step")), InputKind::Geometry);
        assert_eq!(classify_input(Path::new("noext")), InputKind::Geometry);
    }

    #[test]
    fn geometry_batch_run_builds_the_import() {
        let dir = tempfile::tempdir().unwrap();
        let brep = dir.path().join("cube.brep");
        let cube = cad_kernel::primitives::box_solid(
            cad_kernel::Pnt::origin(),
            cad_kernel::geom::vec3(1.0, 0.0, 0.0),
            cad_kernel::geom::vec3(0.0, 1.0, 0.0),
            cad_kernel::geom::vec3(0.0, 0.0, 1.0),
        )
        .unwrap();
        cad_kernel::io::write_brep(&cad_kernel::Shape::Solid(cube), &brep).unwrap();

        let cfg = config::Config::default();
        run_batch(&brep, &cfg).unwrap();
    }

    #[test]
    fn script_input_without_compiler_fails() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("model.iscad");
        std::fs::write(&script, "model: Box(O, EX, EY, EZ);\n").unwrap();
        let cfg = config::Config::default();
        let err = run_batch(&script, &cfg).unwrap_err();
        assert!(err.to_string().contains("script compiler"));
    }
}
