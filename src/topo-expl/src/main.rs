use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use structopt::StructOpt;

use topo_expl::config::CatalogConfig;
use topo_expl::init::SimServices;
use topo_expl::registry::ModelCatalog;
use topo_expl::simulation::Simulation;

use chrono::Timelike;
use env_logger::fmt::Color;

#[derive(Debug, Clone, StructOpt)]
#[structopt(name = "topo-expl", about = "Replays communicator init over a synthetic cluster")]
struct Opts {
    /// Cluster model, by index or id
    #[structopt(short = "m", long = "model")]
    model: Option<String>,
    /// Hardware catalog to load instead of the built-in one
    #[structopt(short, long)]
    catalog: Option<PathBuf>,
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            let time = chrono::Local::now();
            let style = buf
                .style()
                .set_color(Color::Black)
                .set_intense(true)
                .clone();
            let time = format!(
                "{:02}:{:02}:{:02}.{:03}",
                time.hour() % 24,
                time.minute(),
                time.second(),
                time.timestamp_subsec_millis()
            );
            writeln!(
                buf,
                "{}{} {} {}{} {}",
                style.value("["),
                time,
                buf.default_styled_level(record.level()),
                record.module_path().unwrap_or(""),
                style.value("]"),
                record.args()
            )
        })
        .init();
}

fn print_usage(catalog: &ModelCatalog) {
    println!("Usage: topo-expl -m <model>");
    println!("List of models:");
    for entry in catalog.entries() {
        println!("  {}: {} [{}]", entry.index, entry.description, entry.id);
    }
}

fn main() -> Result<()> {
    better_panic::install();
    let opts = Opts::from_args();
    init_logger();

    let catalog = match opts.catalog.as_ref() {
        Some(path) => ModelCatalog::from_config(&CatalogConfig::from_path(path)?)?,
        None => ModelCatalog::builtin()?,
    };
    let model = match opts.model.as_deref() {
        Some(model) => model,
        None => {
            print_usage(&catalog);
            return Ok(());
        }
    };
    let entry = catalog.lookup(model)?;

    println!(
        "Generating topology using {}: {}",
        entry.index, entry.description
    );
    let network = entry.build();
    let report = Simulation::new(&network, SimServices).run()?;
    print!("{}", report);
    println!(
        "Done generating topology using {}: {}",
        entry.index, entry.description
    );
    Ok(())
}
