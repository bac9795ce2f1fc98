use anyhow::Result;
use tracing::debug;
use zksend::{ContractReference, LinkRouting, Network};

use crate::cli::Cli;

#[derive(Debug, Clone)]
pub struct Config {
    pub network: Network,
    pub rpc_url: String,
    pub routing: LinkRouting,
}

impl Config {
    /// Flags override environment variables, which override defaults.
    pub fn from_args(args: &Cli) -> Result<Self> {
        let network: Network = args.chain.parse()?;
        let rpc_url = args
            .rpc_url
            .clone()
            .unwrap_or_else(|| network.rpc_url().to_string());
        let routing = LinkRouting::new(args.host.clone(), args.path.clone());
        debug!("Using {} via {}", network, rpc_url);
        Ok(Self {
            network,
            rpc_url,
            routing,
        })
    }

    pub fn contract(&self) -> Option<ContractReference> {
        self.network.contract()
    }

    /// zk_bag contract, required for escrow links and history.
    pub fn require_contract(&self) -> Result<ContractReference> {
        self.contract()
            .ok_or_else(|| anyhow::anyhow!("zk_bag is not deployed on {}", self.network))
    }
}
