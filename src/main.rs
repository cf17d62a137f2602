use anyhow::Context;
use prewarm::address::TOOL_NAME;
use prewarm_core::Config;

fn main() -> anyhow::Result<()> {
    let config = Config::from_env();
    prewarm::logging::init(config.debug);

    let result = prewarm::launch(&config).with_context(|| format!("{TOOL_NAME} launch failed"))?;
    // The remote exit code is ours, untranslated.
    std::process::exit(result.exit_code as i32)
}
