use ballbyball::api;
use ballbyball::logging;
use ballbyball::settings::AppSettings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = AppSettings::load_from_env()?;
    logging::initialize_logging(&settings);
    api::serve(&settings).await
}
