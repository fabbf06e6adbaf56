//! Scenario runner

use crate::config::HostConfig;
use crate::contract::Compiler;
use crate::scenario::{
    parse_amount, parse_token, parse_value, AccountSpec, Scenario, ScenarioError, StateExpectation,
    Step, TxExpectation, TxSpec,
};
use crate::world::{Account, PendingAsyncCall, Transaction, TransactionResult, WorldHost};
use std::path::Path;

/// Summary of a scenario run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScenarioReport {
    pub name: String,
    pub steps: usize,
    pub transactions: usize,
    /// Cross-shard calls delivered and resumed
    pub deliveries: usize,
    /// Cross-shard calls still waiting when the scenario ended
    pub pending: usize,
}

/// Runs the steps of one scenario against a fresh world
pub struct ScenarioRunner {
    world: WorldHost,
    pending: Vec<PendingAsyncCall>,
    report: ScenarioReport,
}

impl ScenarioRunner {
    /// Build the initial world of `scenario`; its own config, if any, wins
    /// over `config`
    pub fn new(scenario: &Scenario, config: HostConfig) -> Result<Self, ScenarioError> {
        let config = scenario.config.clone().unwrap_or(config);
        config.validate()?;

        let mut world = WorldHost::new(config);
        for spec in &scenario.accounts {
            let account = build_account(&world, spec)?;
            world.add_account(account)?;
            for (token, amount) in &spec.esdt {
                world
                    .ledger_mut()
                    .mint(spec.address.as_bytes(), parse_token(token)?, parse_amount(amount)?)
                    .map_err(crate::world::WorldError::from)?;
            }
        }

        Ok(Self {
            world,
            pending: Vec::new(),
            report: ScenarioReport {
                name: scenario.name.clone(),
                ..Default::default()
            },
        })
    }

    pub fn world(&self) -> &WorldHost {
        &self.world
    }

    /// Cross-shard calls not delivered yet
    pub fn pending(&self) -> &[PendingAsyncCall] {
        &self.pending
    }

    /// Run every step, stopping at the first unmet expectation
    pub fn run(&mut self, scenario: &Scenario) -> Result<ScenarioReport, ScenarioError> {
        log::info!(
            "running scenario '{}' ({} steps)",
            scenario.name,
            scenario.steps.len()
        );
        for (index, step) in scenario.steps.iter().enumerate() {
            let step_number = index + 1;
            match step {
                Step::Tx { tx, expect } => {
                    let result = self.run_tx(tx)?;
                    if let Some(expect) = expect {
                        self.check_tx(step_number, &result, expect)?;
                    }
                }
                Step::DeliverPending { expect } => {
                    self.deliver_pending()?;
                    if let Some(expect) = expect {
                        self.check_state(step_number, expect)?;
                    }
                }
                Step::Check { expect } => self.check_state(step_number, expect)?,
            }
            self.report.steps += 1;
        }

        self.report.pending = self.pending.len();
        log::info!(
            "scenario '{}' passed: {} transactions, {} deliveries",
            scenario.name,
            self.report.transactions,
            self.report.deliveries
        );
        Ok(self.report.clone())
    }

    fn run_tx(&mut self, spec: &TxSpec) -> Result<TransactionResult, ScenarioError> {
        let arguments = spec
            .arguments
            .iter()
            .map(|argument| parse_value(argument))
            .collect::<Result<Vec<_>, _>>()?;
        let tx = Transaction {
            sender: spec.from.as_bytes().to_vec(),
            receiver: spec.to.as_bytes().to_vec(),
            function: spec.function.clone(),
            arguments,
            value: parse_amount(&spec.value)?,
            gas_limit: spec.gas_limit,
            gas_price: spec.gas_price,
        };

        let result = self.world.execute_transaction(&tx)?;
        self.pending.extend(result.pending_async_calls());
        self.report.transactions += 1;
        Ok(result)
    }

    /// Deliver pending calls in the order they were produced
    pub fn deliver_pending(&mut self) -> Result<(), ScenarioError> {
        while !self.pending.is_empty() {
            let pending = self.pending.remove(0);
            let delivered = self.world.deliver_async_call(&pending)?;
            self.pending.extend(delivered.pending_async_calls());

            let resumed = self.world.resume_async_call(&pending, &delivered.output)?;
            self.pending.extend(resumed.pending_async_calls());
            self.report.deliveries += 1;
        }
        Ok(())
    }

    fn check_tx(
        &self,
        step: usize,
        result: &TransactionResult,
        expect: &TxExpectation,
    ) -> Result<(), ScenarioError> {
        let output = &result.output;
        if let Some(return_code) = expect.return_code {
            ensure(step, output.return_code == return_code, || {
                format!(
                    "expected return code '{}', got '{}' ({})",
                    return_code, output.return_code, output.return_message
                )
            })?;
        }
        if let Some(message) = &expect.message {
            ensure(step, output.return_message.contains(message.as_str()), || {
                format!("expected message containing '{}', got '{}'", message, output.return_message)
            })?;
        }
        if let Some(return_data) = &expect.return_data {
            let expected = return_data
                .iter()
                .map(|value| parse_value(value))
                .collect::<Result<Vec<_>, _>>()?;
            ensure(step, output.return_data == expected, || {
                format!(
                    "expected return data {:?}, got {:?}",
                    hex_list(&expected),
                    hex_list(&output.return_data)
                )
            })?;
        }
        if let Some(gas_remaining) = expect.gas_remaining {
            ensure(step, output.gas_remaining == gas_remaining, || {
                format!("expected {} gas remaining, got {}", gas_remaining, output.gas_remaining)
            })?;
        }
        if let Some(complete) = expect.complete {
            ensure(step, result.is_complete == complete, || {
                format!("expected complete = {}, got {}", complete, result.is_complete)
            })?;
        }
        self.check_state(step, &expect.state)
    }

    fn check_state(&self, step: usize, expect: &StateExpectation) -> Result<(), ScenarioError> {
        for (address, balance) in &expect.balances {
            let expected = parse_amount(balance)?;
            let actual = self.world.balance_of(address.as_bytes());
            ensure(step, actual == expected, || {
                format!("balance of {}: expected {}, got {}", address, expected, actual)
            })?;
        }

        for (address, tokens) in &expect.esdt {
            for (token, amount) in tokens {
                let expected = parse_amount(amount)?;
                let actual = self
                    .world
                    .ledger()
                    .balance_of(address.as_bytes(), &parse_token(token)?);
                ensure(step, actual == expected, || {
                    format!("{} of {}: expected {}, got {}", token, address, expected, actual)
                })?;
            }
        }

        for (address, entries) in &expect.storage {
            let account = self.world.account(address.as_bytes());
            for (key, value) in entries {
                let expected = parse_value(value)?;
                let actual = account
                    .and_then(|account| account.storage.get(&parse_value(key).ok()?))
                    .cloned()
                    .unwrap_or_default();
                ensure(step, actual == expected, || {
                    format!(
                        "storage {} of {}: expected 0x{}, got 0x{}",
                        key,
                        address,
                        hex::encode(&expected),
                        hex::encode(&actual)
                    )
                })?;
            }
        }

        if let Some(statuses) = &expect.async_calls {
            let actual: Vec<_> = self
                .world
                .async_log()
                .iter()
                .map(|record| record.status)
                .collect();
            ensure(step, &actual == statuses, || {
                format!("expected async call statuses {:?}, got {:?}", statuses, actual)
            })?;
        }
        Ok(())
    }
}

/// Load and run a scenario file
pub fn run_file(path: &Path, config: HostConfig) -> Result<ScenarioReport, ScenarioError> {
    let scenario = Scenario::load(path)?;
    let mut runner = ScenarioRunner::new(&scenario, config)?;
    runner.run(&scenario)
}

fn build_account(world: &WorldHost, spec: &AccountSpec) -> Result<Account, ScenarioError> {
    let address = spec.address.as_bytes().to_vec();
    let shard = spec.shard.unwrap_or_else(|| world.shard_of(&address));
    let mut account = Account::new(address, shard).with_balance(parse_amount(&spec.balance)?);

    if let Some(source) = &spec.code {
        let module = Compiler::new()
            .compile(source)
            .map_err(|source| ScenarioError::Compile {
                account: spec.address.clone(),
                source,
            })?;
        account = account.with_code(module);
    }
    for (key, value) in &spec.storage {
        account.storage.insert(parse_value(key)?, parse_value(value)?);
    }
    Ok(account)
}

fn ensure(step: usize, condition: bool, message: impl FnOnce() -> String) -> Result<(), ScenarioError> {
    if condition {
        Ok(())
    } else {
        Err(ScenarioError::Expectation {
            step,
            message: message(),
        })
    }
}

fn hex_list(values: &[Vec<u8>]) -> Vec<String> {
    values.iter().map(hex::encode).collect()
}
