use std::fmt;
use std::str::FromStr;

use sui_sdk_types::Address;

use crate::error::ZkSendError;

pub const ZK_BAG_MODULE: &str = "zk_bag";

const DEVNET_RPC_URL: &str = "https://fullnode.devnet.sui.io:443";
const TESTNET_RPC_URL: &str = "https://fullnode.testnet.sui.io:443";
const MAINNET_RPC_URL: &str = "https://fullnode.mainnet.sui.io:443";

const MAINNET_PACKAGE_ID: [u8; 32] =
    hex_address("0x5bb7d0bb3240011336ca9015f553b2646302a4f05f821160344e9ec5a988f740");
const MAINNET_BAG_STORE_ID: [u8; 32] =
    hex_address("0x65b215a3f2a951c94313a89c43f0adbd2fd9ea78a0badf81e27d1c9868a8b6fe");
const MAINNET_BAG_STORE_TABLE_ID: [u8; 32] =
    hex_address("0x616db54ca564660cd58e36a4548be68b289371ef2611485c62c374a60960084e");

const TESTNET_PACKAGE_ID: [u8; 32] =
    hex_address("0x036fee67274d0d85c3532f58296abe0dee86b93864f1b2b9074be6adb388f138");
const TESTNET_BAG_STORE_ID: [u8; 32] =
    hex_address("0x5c63e71734c82c48a3cb9124c54001d1a09736cfb1668b3b30cd92a96dd4d0ce");
const TESTNET_BAG_STORE_TABLE_ID: [u8; 32] =
    hex_address("0x4e1bc4085d64005e03eb4eab2510d527aeba9548cda431cb8f149ff37451f870");

/// Deployed zk_bag escrow contract: the package, its shared `BagStore` and
/// the table inside the store that maps link addresses to bags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractReference {
    pub package_id: Address,
    pub store_id: Address,
    pub store_table_id: Address,
}

impl ContractReference {
    pub fn mainnet() -> Self {
        Self {
            package_id: Address::new(MAINNET_PACKAGE_ID),
            store_id: Address::new(MAINNET_BAG_STORE_ID),
            store_table_id: Address::new(MAINNET_BAG_STORE_TABLE_ID),
        }
    }

    pub fn testnet() -> Self {
        Self {
            package_id: Address::new(TESTNET_PACKAGE_ID),
            store_id: Address::new(TESTNET_BAG_STORE_ID),
            store_table_id: Address::new(TESTNET_BAG_STORE_TABLE_ID),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Devnet,
    Testnet,
    Mainnet,
}

impl Network {
    pub fn rpc_url(&self) -> &'static str {
        match self {
            Network::Devnet => DEVNET_RPC_URL,
            Network::Testnet => TESTNET_RPC_URL,
            Network::Mainnet => MAINNET_RPC_URL,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Devnet => "devnet",
            Network::Testnet => "testnet",
            Network::Mainnet => "mainnet",
        }
    }

    /// zk_bag deployment on this network. Devnet has none, so only direct
    /// links work there.
    pub fn contract(&self) -> Option<ContractReference> {
        match self {
            Network::Devnet => None,
            Network::Testnet => Some(ContractReference::testnet()),
            Network::Mainnet => Some(ContractReference::mainnet()),
        }
    }
}

impl FromStr for Network {
    type Err = ZkSendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "devnet" => Ok(Network::Devnet),
            "testnet" => Ok(Network::Testnet),
            "mainnet" => Ok(Network::Mainnet),
            _ => Err(ZkSendError::UnknownNetwork(s.to_string())),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const fn hex_address(hex: &str) -> [u8; 32] {
    let bytes = hex.as_bytes();
    assert!(bytes.len() == 66 && bytes[0] == b'0' && bytes[1] == b'x');
    let mut out = [0u8; 32];
    let mut i = 0;
    while i < 32 {
        out[i] = (hex_nibble(bytes[2 + 2 * i]) << 4) | hex_nibble(bytes[3 + 2 * i]);
        i += 1;
    }
    out
}

const fn hex_nibble(c: u8) -> u8 {
    match c {
        b'0'..=b'9' => c - b'0',
        b'a'..=b'f' => c - b'a' + 10,
        b'A'..=b'F' => c - b'A' + 10,
        _ => panic!("invalid hex digit in address constant"),
    }
}
