//! Lifecycle of a link opened by a claimer.
//!
//! ```text
//! Uninitialized -> Loading -> Ready | AlreadyClaimed | LoadError
//! Ready -> Claiming -> Claimed | ClaimFailed | AlreadyClaimed
//! ```
//!
//! `reload` re-runs loading from any state, so a link claimed elsewhere
//! reports `AlreadyClaimed`.

use sui_sdk_types::Address;
use tracing::{info, warn};

use crate::claim::claim_link;
use crate::error::{Result, ZkSendError};
use crate::keypair::TransactionSigner;
use crate::ledger::Ledger;
use crate::link::ClaimLink;
use crate::network::ContractReference;
use crate::snapshot::{LinkAssetsSnapshot, fetch_snapshot};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    Uninitialized,
    Loading,
    /// Assets are present and a claim may be started.
    Ready(LinkAssetsSnapshot),
    AlreadyClaimed,
    LoadError(ZkSendError),
    Claiming,
    Claimed { digest: String },
    ClaimFailed(ZkSendError),
}

pub struct LinkSession<'a, L: Ledger + ?Sized> {
    ledger: &'a L,
    contract: Option<ContractReference>,
    link: Option<ClaimLink>,
    state: LinkState,
}

impl<'a, L: Ledger + ?Sized> LinkSession<'a, L> {
    pub fn new(ledger: &'a L, contract: Option<ContractReference>) -> Self {
        Self {
            ledger,
            contract,
            link: None,
            state: LinkState::Uninitialized,
        }
    }

    pub fn state(&self) -> &LinkState {
        &self.state
    }

    pub fn link(&self) -> Option<&ClaimLink> {
        self.link.as_ref()
    }

    /// Decodes `url` and loads what the link holds. Codec errors land in
    /// `LoadError` without touching the ledger.
    pub async fn load_from_url(&mut self, url: &str) -> &LinkState {
        match ClaimLink::from_url(url) {
            Ok(link) => {
                self.link = Some(link);
                self.reload().await
            }
            Err(e) => {
                warn!("Failed to decode link: {}", e);
                self.link = None;
                self.state = LinkState::LoadError(e);
                &self.state
            }
        }
    }

    /// Takes a fresh snapshot of the current link.
    pub async fn reload(&mut self) -> &LinkState {
        let Some(link) = &self.link else {
            self.state = LinkState::LoadError(ZkSendError::InvalidState(
                "no link has been loaded".to_string(),
            ));
            return &self.state;
        };
        self.state = LinkState::Loading;

        let result = fetch_snapshot(
            self.ledger,
            link.address(),
            link.variant(),
            self.contract.as_ref(),
        )
        .await;
        self.state = match result {
            Ok(snapshot) if snapshot.is_claimable() => LinkState::Ready(snapshot),
            Ok(_) => LinkState::AlreadyClaimed,
            Err(e) => {
                warn!("Failed to load link {}: {}", link.address(), e);
                LinkState::LoadError(e)
            }
        };
        &self.state
    }

    /// Claims to `recipient`. Only valid from `Ready`; `sponsor` pays gas for
    /// escrow links. Once submitted the claim cannot be cancelled.
    pub async fn initiate_claim(
        &mut self,
        recipient: Address,
        sponsor: Option<&dyn TransactionSigner>,
    ) -> Result<String> {
        if !matches!(self.state, LinkState::Ready(_)) {
            return Err(ZkSendError::InvalidState(format!(
                "cannot claim from state {:?}",
                self.state
            )));
        }
        let Some(link) = self.link.as_ref() else {
            return Err(ZkSendError::InvalidState("no link has been loaded".to_string()));
        };
        self.state = LinkState::Claiming;

        let result = claim_link(
            self.ledger,
            link,
            recipient,
            self.contract.as_ref(),
            sponsor,
        )
        .await;
        match result {
            Ok(digest) => {
                info!("Claimed link {} in {}", link.address(), digest);
                self.state = LinkState::Claimed {
                    digest: digest.clone(),
                };
                Ok(digest)
            }
            Err(ZkSendError::AlreadyClaimed) => {
                self.state = LinkState::AlreadyClaimed;
                Err(ZkSendError::AlreadyClaimed)
            }
            Err(e) => {
                self.state = LinkState::ClaimFailed(e.clone());
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coin::CoinType;
    use crate::funding::CLAIM_GAS_RESERVE;
    use crate::keypair::Keypair;
    use crate::link::{LinkRouting, LinkVariant};
    use crate::memory::MemoryLedger;

    #[tokio::test]
    async fn test_bad_url_is_load_error() {
        let ledger = MemoryLedger::default();
        let mut session = LinkSession::new(&ledger, None);
        assert!(matches!(
            session.load_from_url("https://zksend.com/claim#!bad").await,
            LinkState::LoadError(ZkSendError::UnknownVariant('!'))
        ));
        assert!(session.link().is_none());
    }

    #[tokio::test]
    async fn test_claim_from_wrong_state_is_rejected() {
        let ledger = MemoryLedger::default();
        let mut session = LinkSession::new(&ledger, None);
        let err = session
            .initiate_claim(Address::new([1u8; 32]), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ZkSendError::InvalidState(_)));
        assert_eq!(session.state(), &LinkState::Uninitialized);
    }

    #[tokio::test]
    async fn test_direct_lifecycle() {
        let ledger = MemoryLedger::default();
        let link = ClaimLink::new(
            Keypair::from_secret_bytes([4u8; 32]),
            LinkVariant::Direct,
            LinkRouting::default(),
        );
        ledger.mint(link.address(), &CoinType::sui(), 1_000 + CLAIM_GAS_RESERVE);
        let url = link.url().unwrap();

        let mut session = LinkSession::new(&ledger, None);
        assert!(matches!(session.load_from_url(&url).await, LinkState::Ready(_)));

        let recipient = Address::new([0xdd; 32]);
        let digest = session.initiate_claim(recipient, None).await.unwrap();
        assert_eq!(session.state(), &LinkState::Claimed { digest });
        assert_eq!(
            ledger.balance(recipient, &CoinType::sui()),
            1_000 + CLAIM_GAS_RESERVE - ledger.gas_fee()
        );

        assert_eq!(session.reload().await, &LinkState::AlreadyClaimed);
    }
}
