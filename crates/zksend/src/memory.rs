//! In-memory ledger that executes transaction plans against simulated coin
//! objects and zk_bag escrow state. Each execution is atomic: commands run
//! against a copy of the world that is only committed on success.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use parking_lot::Mutex;
use sui_sdk_types::Address;
use tracing::debug;

use crate::coin::CoinType;
use crate::keypair::TransactionSigner;
use crate::ledger::{
    CallInput, CoinMetadata, ExecutionOutcome, ExecutionStatus, Ledger, LedgerError,
    MoveCallSummary, OwnedCoin, TransactionPage, TransactionSummary,
};
use crate::network::{ContractReference, ZK_BAG_MODULE};
use crate::transaction::{Argument, Command, InputArg, MoveCall, ObjectRef, UnsignedTransaction};

type Blake2b256 = Blake2b<U32>;

/// Flat fee charged to the gas coin of every successful transaction.
pub const DEFAULT_GAS_FEE: u64 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Owner {
    Address(Address),
    /// Held in the bag keyed by this link address.
    Bag(Address),
}

#[derive(Debug, Clone)]
struct CoinObject {
    id: Address,
    version: u64,
    owner: Owner,
    coin_type: CoinType,
    balance: u64,
}

impl CoinObject {
    fn object_ref(&self) -> ObjectRef {
        ObjectRef {
            object_id: self.id,
            version: self.version,
            digest: object_digest(&self.id, self.version),
        }
    }

    fn to_owned_coin(&self) -> OwnedCoin {
        OwnedCoin {
            object_ref: self.object_ref(),
            coin_type: self.coin_type.clone(),
            balance: self.balance,
        }
    }
}

#[derive(Debug, Clone)]
struct Bag {
    creator: Address,
    items: Vec<Address>,
}

#[derive(Debug, Clone, Default)]
struct World {
    coins: BTreeMap<Address, CoinObject>,
    bags: HashMap<Address, Bag>,
    next_object: u64,
}

impl World {
    fn create_coin(&mut self, owner: Owner, coin_type: CoinType, balance: u64) -> Address {
        self.next_object += 1;
        let mut hasher = Blake2b256::new();
        hasher.update(b"object");
        hasher.update(self.next_object.to_le_bytes());
        let id = Address::new(hasher.finalize().into());
        self.coins.insert(
            id,
            CoinObject {
                id,
                version: 1,
                owner,
                coin_type,
                balance,
            },
        );
        id
    }

    fn coin_mut(&mut self, id: &Address) -> std::result::Result<&mut CoinObject, String> {
        self.coins
            .get_mut(id)
            .ok_or_else(|| format!("object {id} does not exist"))
    }
}

#[derive(Default)]
struct State {
    world: World,
    history: Vec<TransactionSummary>,
    metadata: HashMap<CoinType, CoinMetadata>,
    next_tx: u64,
}

pub struct MemoryLedger {
    state: Mutex<State>,
    contract: ContractReference,
    gas_fee: u64,
}

impl MemoryLedger {
    pub fn new(contract: ContractReference) -> Self {
        Self {
            state: Mutex::new(State::default()),
            contract,
            gas_fee: DEFAULT_GAS_FEE,
        }
    }

    pub fn with_gas_fee(mut self, gas_fee: u64) -> Self {
        self.gas_fee = gas_fee;
        self
    }

    pub fn contract(&self) -> &ContractReference {
        &self.contract
    }

    pub fn gas_fee(&self) -> u64 {
        self.gas_fee
    }

    /// Creates a new coin object owned by `owner`.
    pub fn mint(&self, owner: Address, coin_type: &CoinType, amount: u64) -> ObjectRef {
        let mut state = self.state.lock();
        let id = state
            .world
            .create_coin(Owner::Address(owner), coin_type.clone(), amount);
        let coin = &state.world.coins[&id];
        coin.object_ref()
    }

    /// Total `coin_type` balance owned by `owner`.
    pub fn balance(&self, owner: Address, coin_type: &CoinType) -> u64 {
        self.state
            .lock()
            .world
            .coins
            .values()
            .filter(|c| c.owner == Owner::Address(owner) && &c.coin_type == coin_type)
            .map(|c| c.balance)
            .sum()
    }

    pub fn set_coin_metadata(&self, coin_type: &CoinType, metadata: CoinMetadata) {
        self.state.lock().metadata.insert(coin_type.clone(), metadata);
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new(ContractReference::testnet())
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn owned_coins(&self, owner: Address) -> Result<Vec<OwnedCoin>, LedgerError> {
        tokio::task::yield_now().await;
        let state = self.state.lock();
        Ok(state
            .world
            .coins
            .values()
            .filter(|c| c.owner == Owner::Address(owner))
            .map(CoinObject::to_owned_coin)
            .collect())
    }

    async fn bag_items(
        &self,
        contract: &ContractReference,
        link: Address,
    ) -> Result<Option<Vec<OwnedCoin>>, LedgerError> {
        tokio::task::yield_now().await;
        if contract != &self.contract {
            return Ok(None);
        }
        let state = self.state.lock();
        Ok(state.world.bags.get(&link).map(|bag| {
            bag.items
                .iter()
                .filter_map(|id| state.world.coins.get(id))
                .map(CoinObject::to_owned_coin)
                .collect()
        }))
    }

    async fn execute(
        &self,
        tx: &UnsignedTransaction,
        signers: &[&dyn TransactionSigner],
    ) -> Result<ExecutionOutcome, LedgerError> {
        tokio::task::yield_now().await;
        for required in tx.required_signers() {
            if !signers.iter().any(|signer| signer.address() == required) {
                return Err(LedgerError::Rejected(format!(
                    "missing signature from {required}"
                )));
            }
        }

        let mut state = self.state.lock();
        state.next_tx += 1;
        let digest = transaction_digest(state.next_tx);

        let mut world = state.world.clone();
        let result = Executor::new(&mut world, tx, &self.contract, self.gas_fee).run();
        let status = match result {
            Ok(()) => {
                state.world = world;
                ExecutionStatus::Success
            }
            Err(error) => ExecutionStatus::Failure {
                errors: vec![error],
            },
        };
        debug!("Executed {} with status {:?}", digest, status);

        let summary = summarize(tx, &digest, state.next_tx, status == ExecutionStatus::Success);
        state.history.push(summary);
        Ok(ExecutionOutcome { digest, status })
    }

    async fn transactions_from(
        &self,
        sender: Address,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<TransactionPage, LedgerError> {
        tokio::task::yield_now().await;
        let state = self.state.lock();
        let newest_first: Vec<&TransactionSummary> = state
            .history
            .iter()
            .rev()
            .filter(|t| t.sender == sender)
            .collect();

        let start = match cursor {
            Some(cursor) => {
                newest_first
                    .iter()
                    .position(|t| t.digest == cursor)
                    .ok_or_else(|| LedgerError::InvalidResponse(format!("unknown cursor {cursor}")))?
                    + 1
            }
            None => 0,
        };
        let transactions: Vec<TransactionSummary> = newest_first
            .iter()
            .skip(start)
            .take(limit)
            .map(|t| (*t).clone())
            .collect();
        let has_next_page = start + transactions.len() < newest_first.len();
        let next_cursor = transactions.last().map(|t| t.digest.clone());

        Ok(TransactionPage {
            transactions,
            next_cursor,
            has_next_page,
        })
    }

    async fn coin_metadata(
        &self,
        coin_type: &CoinType,
    ) -> Result<Option<CoinMetadata>, LedgerError> {
        tokio::task::yield_now().await;
        Ok(self.state.lock().metadata.get(coin_type).cloned())
    }
}

#[derive(Debug, Clone, Copy)]
enum Value {
    Coin(Address),
    Bag(Address),
    Proof(Address),
}

type ExecResult<T> = std::result::Result<T, String>;

struct Executor<'a> {
    world: &'a mut World,
    tx: &'a UnsignedTransaction,
    contract: &'a ContractReference,
    gas_fee: u64,
    gas_coin: Option<Address>,
    results: Vec<Vec<Value>>,
    opened: HashMap<Address, Bag>,
}

impl<'a> Executor<'a> {
    fn new(
        world: &'a mut World,
        tx: &'a UnsignedTransaction,
        contract: &'a ContractReference,
        gas_fee: u64,
    ) -> Self {
        Self {
            world,
            tx,
            contract,
            gas_fee,
            gas_coin: None,
            results: Vec::new(),
            opened: HashMap::new(),
        }
    }

    fn run(mut self) -> ExecResult<()> {
        self.charge_gas()?;
        for (index, command) in self.tx.commands.iter().enumerate() {
            let values = self
                .command(command)
                .map_err(|e| format!("{e} in command {index}"))?;
            self.results.push(values);
        }
        if !self.opened.is_empty() {
            return Err("UnusedValueWithoutDrop: zk_bag::ZkBag".to_string());
        }
        Ok(())
    }

    /// Smashes the gas payment into one coin and deducts the fee from it.
    fn charge_gas(&mut self) -> ExecResult<()> {
        let payer = self.tx.gas.owner;
        let ids: Vec<Address> = if self.tx.gas.payment.is_empty() {
            self.world
                .coins
                .values()
                .filter(|c| c.owner == Owner::Address(payer) && c.coin_type.is_sui())
                .map(|c| c.id)
                .collect()
        } else {
            for object_ref in &self.tx.gas.payment {
                self.check_owned(object_ref, payer)?;
            }
            self.tx.gas.payment.iter().map(|r| r.object_id).collect()
        };

        let (primary, rest) = ids
            .split_first()
            .ok_or_else(|| format!("InsufficientGas: {payer} owns no SUI coins"))?;
        let mut total = self.world.coin_mut(primary)?.balance;
        for id in rest {
            let coin = self
                .world
                .coins
                .remove(id)
                .ok_or_else(|| format!("object {id} does not exist"))?;
            total = total
                .checked_add(coin.balance)
                .ok_or_else(|| "gas balance overflow".to_string())?;
        }
        if total < self.gas_fee {
            return Err(format!(
                "InsufficientGas: balance {total} below fee {}",
                self.gas_fee
            ));
        }

        let gas_fee = self.gas_fee;
        let coin = self.world.coin_mut(primary)?;
        coin.balance = total - gas_fee;
        coin.version += 1;
        self.gas_coin = Some(*primary);
        Ok(())
    }

    fn check_owned(&self, object_ref: &ObjectRef, owner: Address) -> ExecResult<()> {
        let coin = self
            .world
            .coins
            .get(&object_ref.object_id)
            .ok_or_else(|| format!("object {} does not exist", object_ref.object_id))?;
        if coin.version != object_ref.version {
            return Err(format!(
                "ObjectVersionUnavailableForConsumption: {} version {}",
                object_ref.object_id, object_ref.version
            ));
        }
        if coin.owner != Owner::Address(owner) {
            return Err(format!(
                "IncorrectUserSignature: {} is not owned by {owner}",
                object_ref.object_id
            ));
        }
        Ok(())
    }

    fn command(&mut self, command: &Command) -> ExecResult<Vec<Value>> {
        match command {
            Command::SplitBalance { coin_type, amounts } => self.split_balance(coin_type, amounts),
            Command::TransferObjects { objects, recipient } => {
                let recipient = self.address_input(*recipient)?;
                for object in objects {
                    let id = self.coin_argument(*object)?;
                    let coin = self.world.coin_mut(&id)?;
                    coin.owner = Owner::Address(recipient);
                    coin.version += 1;
                }
                Ok(vec![])
            }
            Command::MoveCall(call) => self.move_call(call),
        }
    }

    fn split_balance(&mut self, coin_type: &CoinType, amounts: &[u64]) -> ExecResult<Vec<Value>> {
        let sender = self.tx.sender;
        let needed = amounts
            .iter()
            .try_fold(0u64, |acc, a| acc.checked_add(*a))
            .ok_or_else(|| "split amount overflow".to_string())?;

        let sources: Vec<Address> = match self.gas_coin {
            Some(gas) if coin_type.is_sui() && !self.tx.is_sponsored() => vec![gas],
            _ => self
                .world
                .coins
                .values()
                .filter(|c| {
                    c.owner == Owner::Address(sender)
                        && &c.coin_type == coin_type
                        && Some(c.id) != self.gas_coin
                })
                .map(|c| c.id)
                .collect(),
        };
        let available = sources
            .iter()
            .filter_map(|id| self.world.coins.get(id))
            .fold(0u64, |acc, c| acc.saturating_add(c.balance));
        if available < needed {
            return Err(format!(
                "InsufficientCoinBalance: {coin_type} needs {needed}, sender has {available}"
            ));
        }

        let mut remaining = needed;
        for id in &sources {
            if remaining == 0 {
                break;
            }
            let coin = self.world.coin_mut(id)?;
            let take = remaining.min(coin.balance);
            coin.balance -= take;
            coin.version += 1;
            remaining -= take;
            if coin.balance == 0 && Some(*id) != self.gas_coin {
                self.world.coins.remove(id);
            }
        }

        Ok(amounts
            .iter()
            .map(|amount| {
                Value::Coin(self.world.create_coin(
                    Owner::Address(sender),
                    coin_type.clone(),
                    *amount,
                ))
            })
            .collect())
    }

    fn move_call(&mut self, call: &MoveCall) -> ExecResult<Vec<Value>> {
        if call.package != self.contract.package_id || call.module != ZK_BAG_MODULE {
            return Err(format!(
                "FunctionNotFound: {}::{}::{}",
                call.package, call.module, call.function
            ));
        }
        let sender = self.tx.sender;
        let args = &call.arguments;

        match (call.function.as_str(), args.as_slice()) {
            ("new", [store, receiver]) => {
                self.check_store(*store)?;
                let receiver = self.address_input(*receiver)?;
                if self.world.bags.contains_key(&receiver) {
                    return Err(abort("new", "EClaimAddressAlreadyUsed"));
                }
                self.world.bags.insert(
                    receiver,
                    Bag {
                        creator: sender,
                        items: Vec::new(),
                    },
                );
                Ok(vec![])
            }
            ("add", [store, receiver, item]) => {
                self.check_store(*store)?;
                let receiver = self.address_input(*receiver)?;
                let id = self.coin_argument(*item)?;
                let bag = self
                    .world
                    .bags
                    .get(&receiver)
                    .ok_or_else(|| abort("add", "EClaimAddressNotExists"))?;
                if bag.creator != sender {
                    return Err(abort("add", "EUnauthorized"));
                }

                let expected = call.type_arguments.first().cloned().unwrap_or_default();
                let coin = self.world.coin_mut(&id)?;
                if coin.coin_type.coin_object_type() != expected {
                    return Err(format!("TypeArgumentError: expected {expected}"));
                }
                coin.owner = Owner::Bag(receiver);
                coin.version += 1;
                if let Some(bag) = self.world.bags.get_mut(&receiver) {
                    bag.items.push(id);
                }
                Ok(vec![])
            }
            ("init_claim", [store]) => {
                self.check_store(*store)?;
                let bag = self
                    .world
                    .bags
                    .remove(&sender)
                    .ok_or_else(|| abort("init_claim", "EClaimAddressNotExists"))?;
                self.opened.insert(sender, bag);
                Ok(vec![Value::Bag(sender), Value::Proof(sender)])
            }
            ("reclaim", [store, link]) => {
                self.check_store(*store)?;
                let link = self.address_input(*link)?;
                match self.world.bags.get(&link) {
                    None => return Err(abort("reclaim", "EClaimAddressNotExists")),
                    Some(bag) if bag.creator != sender => {
                        return Err(abort("reclaim", "EUnauthorized"));
                    }
                    Some(_) => {}
                }
                if let Some(bag) = self.world.bags.remove(&link) {
                    self.opened.insert(link, bag);
                }
                Ok(vec![Value::Bag(link), Value::Proof(link)])
            }
            ("claim", [bag, proof, receiving]) => {
                let link = self.opened_bag(*bag, *proof)?;
                let object_ref = match self.tx.input(*receiving) {
                    Some(InputArg::Receiving(object_ref)) => object_ref.clone(),
                    _ => return Err("claim expects a receiving input".to_string()),
                };
                let coin = self.world.coin_mut(&object_ref.object_id)?;
                if coin.version != object_ref.version || coin.owner != Owner::Bag(link) {
                    return Err(format!(
                        "ObjectVersionUnavailableForConsumption: {} version {}",
                        object_ref.object_id, object_ref.version
                    ));
                }
                coin.owner = Owner::Address(sender);
                coin.version += 1;
                if let Some(bag) = self.opened.get_mut(&link) {
                    bag.items.retain(|id| id != &object_ref.object_id);
                }
                Ok(vec![Value::Coin(object_ref.object_id)])
            }
            ("finalize", [bag, proof]) => {
                let link = self.opened_bag(*bag, *proof)?;
                let bag = self
                    .opened
                    .remove(&link)
                    .ok_or_else(|| abort("finalize", "EInvalidClaim"))?;
                if !bag.items.is_empty() {
                    return Err(abort("finalize", "EBagNotEmpty"));
                }
                Ok(vec![])
            }
            (function, _) => Err(format!("FunctionNotFound: zk_bag::{function}")),
        }
    }

    fn opened_bag(&self, bag: Argument, proof: Argument) -> ExecResult<Address> {
        match (self.value(bag)?, self.value(proof)?) {
            (Value::Bag(a), Value::Proof(b)) if a == b && self.opened.contains_key(&a) => Ok(a),
            _ => Err(abort("claim", "EInvalidClaim")),
        }
    }

    fn check_store(&self, store: Argument) -> ExecResult<()> {
        match self.tx.input(store) {
            Some(InputArg::SharedObject {
                object_id,
                mutable: true,
            }) if *object_id == self.contract.store_id => Ok(()),
            _ => Err("expected the mutable BagStore shared object".to_string()),
        }
    }

    fn address_input(&self, argument: Argument) -> ExecResult<Address> {
        match self.tx.input(argument) {
            Some(InputArg::Address(address)) => Ok(*address),
            _ => Err(format!("{argument:?} is not an address input")),
        }
    }

    fn coin_argument(&self, argument: Argument) -> ExecResult<Address> {
        match argument {
            Argument::GasCoin => self
                .gas_coin
                .ok_or_else(|| "transaction has no gas coin".to_string()),
            Argument::Input(_) => match self.tx.input(argument) {
                Some(InputArg::OwnedObject(object_ref)) => {
                    self.check_owned(object_ref, self.tx.sender)?;
                    Ok(object_ref.object_id)
                }
                _ => Err(format!("{argument:?} is not an owned object")),
            },
            _ => match self.value(argument)? {
                Value::Coin(id) => Ok(id),
                other => Err(format!("{other:?} is not a coin")),
            },
        }
    }

    fn value(&self, argument: Argument) -> ExecResult<Value> {
        let value = match argument {
            Argument::Result(command) => self
                .results
                .get(command as usize)
                .filter(|values| values.len() == 1)
                .map(|values| values[0]),
            Argument::NestedResult(command, index) => self
                .results
                .get(command as usize)
                .and_then(|values| values.get(index as usize))
                .copied(),
            _ => None,
        };
        value.ok_or_else(|| format!("invalid argument {argument:?}"))
    }
}

fn abort(function: &str, code: &str) -> String {
    format!("MoveAbort in {ZK_BAG_MODULE}::{function}: {code}")
}

fn object_digest(id: &Address, version: u64) -> String {
    let mut hasher = Blake2b256::new();
    hasher.update(id.as_bytes());
    hasher.update(version.to_le_bytes());
    bs58::encode(hasher.finalize()).into_string()
}

fn transaction_digest(sequence: u64) -> String {
    let mut hasher = Blake2b256::new();
    hasher.update(b"TransactionData::");
    hasher.update(sequence.to_le_bytes());
    bs58::encode(hasher.finalize()).into_string()
}

fn summarize(
    tx: &UnsignedTransaction,
    digest: &str,
    sequence: u64,
    success: bool,
) -> TransactionSummary {
    TransactionSummary {
        digest: digest.to_string(),
        sender: tx.sender,
        timestamp_ms: Some(sequence * 1_000),
        success,
        inputs: tx
            .inputs
            .iter()
            .map(|input| match input {
                InputArg::Address(address) => CallInput::Address(*address),
                InputArg::OwnedObject(r) | InputArg::Receiving(r) => CallInput::Object(r.object_id),
                InputArg::SharedObject { object_id, .. } => CallInput::Object(*object_id),
                InputArg::U64(_) => CallInput::Other,
            })
            .collect(),
        calls: tx
            .move_calls()
            .map(|call| MoveCallSummary {
                package: call.package,
                module: call.module.clone(),
                function: call.function.clone(),
                arguments: call.arguments.clone(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypair::Keypair;
    use crate::transaction::TransactionPlan;

    #[tokio::test]
    async fn test_transfer_and_gas_fee() {
        let ledger = MemoryLedger::default();
        let alice = Keypair::from_secret_bytes([1u8; 32]);
        let bob = Address::new([2u8; 32]);
        ledger.mint(alice.address(), &CoinType::sui(), 10_000_000);

        let mut plan = TransactionPlan::new(alice.address());
        let coins = plan.split_balance(CoinType::sui(), vec![3_000_000]);
        let to = plan.input(InputArg::Address(bob));
        plan.transfer_objects(vec![coins.nested(0).unwrap()], to);
        let outcome = ledger.execute(&plan.finish(), &[&alice]).await.unwrap();

        assert!(outcome.is_success());
        assert_eq!(ledger.balance(bob, &CoinType::sui()), 3_000_000);
        assert_eq!(
            ledger.balance(alice.address(), &CoinType::sui()),
            10_000_000 - 3_000_000 - DEFAULT_GAS_FEE
        );
    }

    #[tokio::test]
    async fn test_failed_execution_changes_nothing() {
        let ledger = MemoryLedger::default();
        let alice = Keypair::from_secret_bytes([1u8; 32]);
        let usdc = CoinType::parse("0x3::usdc::USDC").unwrap();
        ledger.mint(alice.address(), &CoinType::sui(), 10_000_000);
        ledger.mint(alice.address(), &usdc, 5);

        let mut plan = TransactionPlan::new(alice.address());
        let coins = plan.split_balance(usdc.clone(), vec![6]);
        let to = plan.input(InputArg::Address(Address::new([2u8; 32])));
        plan.transfer_objects(vec![coins.nested(0).unwrap()], to);
        let outcome = ledger.execute(&plan.finish(), &[&alice]).await.unwrap();

        match outcome.status {
            ExecutionStatus::Failure { errors } => {
                assert!(errors[0].contains("InsufficientCoinBalance"));
            }
            ExecutionStatus::Success => panic!("expected failure"),
        }
        assert!(!outcome.digest.is_empty());
        assert_eq!(ledger.balance(alice.address(), &usdc), 5);
        assert_eq!(ledger.balance(alice.address(), &CoinType::sui()), 10_000_000);
    }

    #[tokio::test]
    async fn test_missing_signature_is_rejected() {
        let ledger = MemoryLedger::default();
        let alice = Keypair::from_secret_bytes([1u8; 32]);
        let mallory = Keypair::from_secret_bytes([3u8; 32]);
        let plan = TransactionPlan::new(alice.address());
        assert!(matches!(
            ledger.execute(&plan.finish(), &[&mallory]).await,
            Err(LedgerError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn test_history_pagination() {
        let ledger = MemoryLedger::default();
        let alice = Keypair::from_secret_bytes([1u8; 32]);
        ledger.mint(alice.address(), &CoinType::sui(), 100_000_000);

        let mut digests = Vec::new();
        for _ in 0..3 {
            let plan = TransactionPlan::new(alice.address());
            digests.push(ledger.execute(&plan.finish(), &[&alice]).await.unwrap().digest);
        }

        let first = ledger.transactions_from(alice.address(), None, 2).await.unwrap();
        assert_eq!(first.transactions.len(), 2);
        assert_eq!(first.transactions[0].digest, digests[2]);
        assert!(first.has_next_page);

        let second = ledger
            .transactions_from(alice.address(), first.next_cursor.as_deref(), 2)
            .await
            .unwrap();
        assert_eq!(second.transactions.len(), 1);
        assert_eq!(second.transactions[0].digest, digests[0]);
        assert!(!second.has_next_page);
    }
}
