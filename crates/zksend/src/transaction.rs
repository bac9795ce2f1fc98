//! Ledger-agnostic programmable transaction plans.
//!
//! Builders emit an [`UnsignedTransaction`]; a ledger backend resolves object
//! versions and gas, serializes it and submits it.

use sui_sdk_types::Address;

use crate::coin::CoinType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Argument {
    /// The transaction's gas coin.
    GasCoin,
    Input(u16),
    Result(u16),
    NestedResult(u16, u16),
}

impl Argument {
    /// Element `index` of a multi-value command result.
    pub fn nested(self, index: u16) -> Option<Argument> {
        match self {
            Argument::Result(command) => Some(Argument::NestedResult(command, index)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub object_id: Address,
    pub version: u64,
    pub digest: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputArg {
    Address(Address),
    U64(u64),
    OwnedObject(ObjectRef),
    /// Shared object; the backend looks up its initial shared version.
    SharedObject { object_id: Address, mutable: bool },
    /// Object sent to another object's address, received by a Move call.
    Receiving(ObjectRef),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveCall {
    pub package: Address,
    pub module: String,
    pub function: String,
    pub type_arguments: Vec<String>,
    pub arguments: Vec<Argument>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Withdraws each amount from the sender's `coin_type` balance as a new
    /// coin. SUI is split from the gas coin when the sender pays gas.
    SplitBalance {
        coin_type: CoinType,
        amounts: Vec<u64>,
    },
    TransferObjects {
        objects: Vec<Argument>,
        recipient: Argument,
    },
    MoveCall(MoveCall),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GasConfig {
    /// Pays for gas and co-signs when different from the sender.
    pub owner: Address,
    /// Explicit gas coins; empty lets the backend select the owner's SUI coins.
    pub payment: Vec<ObjectRef>,
    pub budget: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    pub sender: Address,
    pub gas: GasConfig,
    pub inputs: Vec<InputArg>,
    pub commands: Vec<Command>,
}

impl UnsignedTransaction {
    /// Addresses whose signatures the ledger will require.
    pub fn required_signers(&self) -> Vec<Address> {
        let mut signers = vec![self.sender];
        if self.gas.owner != self.sender {
            signers.push(self.gas.owner);
        }
        signers
    }

    pub fn is_sponsored(&self) -> bool {
        self.gas.owner != self.sender
    }

    pub fn input(&self, argument: Argument) -> Option<&InputArg> {
        match argument {
            Argument::Input(index) => self.inputs.get(index as usize),
            _ => None,
        }
    }

    pub fn move_calls(&self) -> impl Iterator<Item = &MoveCall> {
        self.commands.iter().filter_map(|command| match command {
            Command::MoveCall(call) => Some(call),
            _ => None,
        })
    }

    /// Sum of every `SplitBalance` amount of `coin_type`.
    pub fn split_total(&self, coin_type: &CoinType) -> u128 {
        self.commands
            .iter()
            .filter_map(|command| match command {
                Command::SplitBalance { coin_type: ct, amounts } if ct == coin_type => {
                    Some(amounts.iter().map(|a| *a as u128).sum::<u128>())
                }
                _ => None,
            })
            .sum()
    }

    /// Recipients of `TransferObjects` commands, in command order.
    pub fn transfer_recipients(&self) -> Vec<Address> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                Command::TransferObjects { recipient, .. } => match self.input(*recipient) {
                    Some(InputArg::Address(address)) => Some(*address),
                    _ => None,
                },
                _ => None,
            })
            .collect()
    }
}

/// Incremental builder for [`UnsignedTransaction`].
#[derive(Debug, Clone)]
pub struct TransactionPlan {
    sender: Address,
    gas: GasConfig,
    inputs: Vec<InputArg>,
    commands: Vec<Command>,
}

impl TransactionPlan {
    pub fn new(sender: Address) -> Self {
        Self {
            sender,
            gas: GasConfig {
                owner: sender,
                payment: Vec::new(),
                budget: None,
            },
            inputs: Vec::new(),
            commands: Vec::new(),
        }
    }

    pub fn set_gas_owner(&mut self, owner: Address) {
        self.gas.owner = owner;
    }

    pub fn set_gas_payment(&mut self, payment: Vec<ObjectRef>) {
        self.gas.payment = payment;
    }

    pub fn set_gas_budget(&mut self, budget: u64) {
        self.gas.budget = Some(budget);
    }

    /// Adds an input, reusing an identical one already present.
    pub fn input(&mut self, input: InputArg) -> Argument {
        // Plans stay far below u16::MAX inputs and commands
        if let Some(index) = self.inputs.iter().position(|existing| existing == &input) {
            return Argument::Input(index as u16);
        }
        self.inputs.push(input);
        Argument::Input((self.inputs.len() - 1) as u16)
    }

    pub fn split_balance(&mut self, coin_type: CoinType, amounts: Vec<u64>) -> Argument {
        self.push(Command::SplitBalance { coin_type, amounts })
    }

    pub fn transfer_objects(&mut self, objects: Vec<Argument>, recipient: Argument) {
        self.push(Command::TransferObjects { objects, recipient });
    }

    pub fn move_call(
        &mut self,
        package: Address,
        module: &str,
        function: &str,
        type_arguments: Vec<String>,
        arguments: Vec<Argument>,
    ) -> Argument {
        self.push(Command::MoveCall(MoveCall {
            package,
            module: module.to_string(),
            function: function.to_string(),
            type_arguments,
            arguments,
        }))
    }

    pub fn finish(self) -> UnsignedTransaction {
        UnsignedTransaction {
            sender: self.sender,
            gas: self.gas,
            inputs: self.inputs,
            commands: self.commands,
        }
    }

    fn push(&mut self, command: Command) -> Argument {
        self.commands.push(command);
        Argument::Result((self.commands.len() - 1) as u16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inputs_are_deduplicated() {
        let sender = Address::new([1u8; 32]);
        let other = Address::new([2u8; 32]);
        let mut plan = TransactionPlan::new(sender);

        let a = plan.input(InputArg::Address(other));
        let b = plan.input(InputArg::U64(5));
        let c = plan.input(InputArg::Address(other));
        assert_eq!(a, Argument::Input(0));
        assert_eq!(b, Argument::Input(1));
        assert_eq!(c, a);
        assert_eq!(plan.finish().inputs.len(), 2);
    }

    #[test]
    fn test_plan_accounting() {
        let sender = Address::new([1u8; 32]);
        let recipient = Address::new([3u8; 32]);
        let mut plan = TransactionPlan::new(sender);

        let coins = plan.split_balance(CoinType::sui(), vec![10, 20]);
        let to = plan.input(InputArg::Address(recipient));
        plan.transfer_objects(
            vec![coins.nested(0).unwrap(), coins.nested(1).unwrap()],
            to,
        );
        let tx = plan.finish();

        assert_eq!(tx.split_total(&CoinType::sui()), 30);
        assert_eq!(tx.transfer_recipients(), vec![recipient]);
        assert_eq!(tx.required_signers(), vec![sender]);
        assert!(!tx.is_sponsored());
        assert_eq!(Argument::GasCoin.nested(0), None);
    }

    #[test]
    fn test_sponsored_signers() {
        let sender = Address::new([1u8; 32]);
        let sponsor = Address::new([9u8; 32]);
        let mut plan = TransactionPlan::new(sender);
        plan.set_gas_owner(sponsor);
        let tx = plan.finish();
        assert!(tx.is_sponsored());
        assert_eq!(tx.required_signers(), vec![sender, sponsor]);
    }
}
