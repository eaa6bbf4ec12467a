use address_pool::{
    AddressPools, Branch, ChainHistory, EsploraChainHistory, FileCheckpointStore, NoChainHistory,
    PoolConfig, WatchList, XpubAddressSource,
};
use bitcoin::Address;
use std::env;
use std::sync::Arc;

fn main() -> anyhow::Result<()> {
    // Initialize logger (set RUST_LOG=debug for verbose output, RUST_LOG=info for normal)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // POOL_XPUB takes a bare xpub/tpub or a BIP84 descriptor
    let descriptor = env::var("POOL_XPUB")
        .map_err(|_| anyhow::anyhow!("POOL_XPUB must be set to an account xpub or descriptor"))?;
    let count: usize = match env::args().nth(1) {
        Some(raw) => raw
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid address count '{}'", raw))?,
        None => 1,
    };

    let config = PoolConfig::from_env();
    let store = FileCheckpointStore::new(&config.state_path);
    let source = XpubAddressSource::from_descriptor(&descriptor, config.network, store)?;

    let chain: Arc<dyn ChainHistory<Address> + Send + Sync> = if config.address_reuse {
        Arc::new(EsploraChainHistory::from_config(&config)?)
    } else {
        Arc::new(NoChainHistory)
    };

    let pools = AddressPools::new(source, chain, WatchList::new(), config);
    pools.initialize()?;

    let mut batch = pools.begin_batch(Branch::External)?;
    let mut addresses = Vec::with_capacity(count);
    for _ in 0..count {
        addresses.push(batch.next_address()?);
    }
    batch.commit();

    for address in &addresses {
        println!("{}", address);
    }
    log::info!(
        "Issued {} receive addresses, {} awaiting watch registration",
        addresses.len(),
        pools.watcher().len()?
    );

    pools.close_pools()?;
    Ok(())
}
