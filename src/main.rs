use anyhow::Result;
use company_research::utils::logging;
use company_research::{App, Config};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::from_env()?;

    // 初始化日志
    logging::init(config.verbose_logging);

    if let Err(e) = config.validate() {
        error!("❌ 配置错误: {}", e);
        return Err(e.into());
    }

    // 初始化并运行应用
    let app = App::initialize(config).await?;

    let abort = app.abort_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("收到 Ctrl-C");
            abort.abort();
        }
    });

    let summary = app.run().await?;
    if summary.failed > 0 {
        info!("有 {} 个条目失败，详见 _errors.json", summary.failed);
    }

    Ok(())
}
