//! Goods demo: one component keeping a gold balance in a save file.
//!
//! Each run prints the balance found on disk, sets it to 61 and saves it the
//! way a game host would: flush when focus is lost, unload when the owning
//! component goes away, flush again on quit.
use anyhow::Result;
use savedata::{DataManager, DataManagerConfig, Record, Savable};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct GoodsSaveData {
    gold: u32,
}

impl Savable for GoodsSaveData {
    const KEY: &'static str = "GoodsSaveData";
}

/// Owns the goods record for as long as it is alive.
struct GoodsManager {
    data: DataManager,
    goods: Option<Record<GoodsSaveData>>,
}

impl GoodsManager {
    /// Start loading as early as possible.
    fn awake(data: DataManager) -> Result<Self> {
        data.load_async::<GoodsSaveData>()?;
        Ok(Self { data, goods: None })
    }

    async fn start(&mut self) -> Result<()> {
        let goods = self.data.load::<GoodsSaveData>().await?;
        println!("Gold: {}", goods.read().gold);
        self.goods = Some(goods);

        self.set_gold(61)
    }

    fn set_gold(&self, gold: u32) -> Result<()> {
        if let Some(goods) = &self.goods {
            goods.write().gold = gold;
            self.data.mark_dirty::<GoodsSaveData>()?;
        }
        Ok(())
    }

    async fn destroy(self) -> Result<()> {
        if let Some(write) = self.data.unload::<GoodsSaveData>()? {
            write.await?;
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = DataManagerConfig::from_env();
    let data = DataManager::builder().config(config).build()?;
    let hooks = data.lifecycle_hooks();

    let mut goods = GoodsManager::awake(data.clone())?;
    data.await_pending_loads().await?;
    goods.start().await?;

    // Host callbacks block, so they run off the async workers
    let focus_hooks = hooks.clone();
    let written = tokio::task::spawn_blocking(move || focus_hooks.focus_changed(false)).await??;
    tracing::info!("Saved {} record(s) on focus loss", written);

    goods.destroy().await?;

    tokio::task::spawn_blocking(move || hooks.quitting()).await??;

    let metrics = data.metrics().snapshot();
    tracing::info!(
        "Done: {} disk load(s), {} default(s), {} write(s)",
        metrics.disk_loads,
        metrics.defaults_created,
        metrics.writes_completed
    );

    Ok(())
}
