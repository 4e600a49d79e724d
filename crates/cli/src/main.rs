mod engine;
mod registry;

use std::path::PathBuf;

use structopt::StructOpt;

use regraft_core::{
    graphdef::{load::load_graphdef, save::save_graphdef},
    plugin::{ConcatSchema, NMS_NAME},
    rewrite::rewrite_for_engine,
};

#[derive(Debug, StructOpt)]
#[structopt(
    name = "build_engine",
    about = "Rewrites a frozen SSD detector graph into a plugin graph and compiles the inference engine"
)]
struct Opt {
    #[structopt(
        help = "Model to convert",
        possible_values = &registry::SUPPORTED_MODELS
    )]
    model: String,

    #[structopt(
        long = "model-dir",
        help = "Directory holding the frozen graphs and build artifacts",
        default_value = ".",
        parse(from_os_str)
    )]
    model_dir: PathBuf,

    #[structopt(
        long = "compiler-major",
        help = "Major version of the target engine compiler",
        default_value = "7"
    )]
    compiler_major: u32,

    #[structopt(
        long = "compiler",
        help = "External engine-compiler executable",
        default_value = "uff2engine",
        parse(from_os_str)
    )]
    compiler: PathBuf,

    #[structopt(
        long = "workspace",
        help = "Engine workspace memory ceiling in bytes",
        default_value = "268435456"
    )]
    workspace: u64,

    #[structopt(long = "batch", help = "Engine batch size", default_value = "1")]
    batch: u32,

    #[structopt(long = "skip-engine", help = "Stop after writing the interchange file")]
    skip_engine: bool,
}

fn main() {
    env_logger::init();
    color_backtrace::install();

    let opt = Opt::from_args();
    if let Err(err) = run(opt) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run(opt: Opt) -> Result<(), Box<dyn std::error::Error>> {
    let entry = registry::lookup(&opt.model, &opt.model_dir)?;
    let schema = ConcatSchema::for_compiler_major(opt.compiler_major);

    let mut graph = load_graphdef(&entry.input_pb)?;
    log::info!("loaded '{}': {} nodes", entry.input_pb.display(), graph.len());

    rewrite_for_engine(&mut graph, &entry.spec, schema)?;
    save_graphdef(&graph, &entry.tmp_uff, &[NMS_NAME.to_string()])?;
    log::info!("wrote '{}': {} nodes", entry.tmp_uff.display(), graph.len());

    if opt.skip_engine {
        return Ok(());
    }

    let opts = engine::EngineOptions {
        compiler: opt.compiler,
        max_workspace_size: opt.workspace,
        max_batch_size: opt.batch,
    };
    engine::build_engine(&entry.tmp_uff, &entry.output_bin, NMS_NAME, &opts)?;
    log::info!("wrote '{}'", entry.output_bin.display());

    Ok(())
}
