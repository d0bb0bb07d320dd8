#[macro_use]
extern crate log;

mod app;
mod rand_source;

use windflow::runtime::logger::init_log;
use windflow::utils::thread::async_runtime_multi;

pub fn main() -> anyhow::Result<()> {
    let path = std::env::args().nth(1);
    let properties = app::load_properties(path.as_deref())?;

    init_log("INFO")?;

    let runtime = async_runtime_multi("windows", 4)?;
    runtime.block_on(app::run(properties))
}
