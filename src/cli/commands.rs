//! CLI commands for the VM host
//!
//! Implements all command handlers for the CLI interface.

use crate::async_call::{AsyncContext, SerializableAsyncContext};
use crate::config::HostConfig;
use crate::contract::{disassemble, Compiler};
use crate::scenario::{Scenario, ScenarioRunner};
use crate::world::display_address;
use std::fs;
use std::path::Path;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Load the host configuration, or the defaults when no file is given
pub fn load_config(path: Option<&Path>) -> CliResult<HostConfig> {
    match path {
        Some(path) => Ok(HostConfig::load(path)?),
        None => Ok(HostConfig::default()),
    }
}

/// Run a scenario file
pub fn cmd_run(config: HostConfig, file: &Path) -> CliResult<()> {
    let scenario = Scenario::load(file)?;
    let name = if scenario.name.is_empty() {
        file.display().to_string()
    } else {
        scenario.name.clone()
    };

    println!("▶️  Running scenario: {}", name);
    println!("   Accounts: {}", scenario.accounts.len());
    println!("   Steps: {}", scenario.steps.len());

    let mut runner = ScenarioRunner::new(&scenario, config)?;
    let report = match runner.run(&scenario) {
        Ok(report) => report,
        Err(err) => {
            println!("\n❌ Scenario failed: {}", err);
            return Err(err.into());
        }
    };

    println!("\n✅ Scenario passed!");
    println!("   ├─ Steps: {}", report.steps);
    println!("   ├─ Transactions: {}", report.transactions);
    println!("   ├─ Cross-shard deliveries: {}", report.deliveries);
    println!("   └─ Still pending: {}", report.pending);

    let records = runner.world().async_log();
    if !records.is_empty() {
        println!("\n📨 Async calls:");
        for record in records {
            println!(
                "   {} -> {} [{}] {:?}",
                display_address(&record.source),
                display_address(&record.destination),
                hex::encode(&record.call_id),
                record.status
            );
        }
    }

    Ok(())
}

/// Assemble a contract, optionally writing the module as JSON
pub fn cmd_compile(file: &Path, output: Option<&Path>) -> CliResult<()> {
    let source = fs::read_to_string(file)?;
    let module = Compiler::new().compile(&source)?;

    println!("✅ Contract compiled!");
    println!("   📦 Bytecode size: {} bytes", module.code.len());
    println!("   🔧 Functions:");
    for (name, offset) in &module.functions {
        println!("      {} @ 0x{:04x}", name, offset);
    }
    println!("\n   Bytecode: {}", hex::encode(&module.code));

    if let Some(output) = output {
        fs::write(output, serde_json::to_string_pretty(&module)?)?;
        println!("\n💾 Module written to {}", output.display());
    }

    Ok(())
}

/// Disassemble hex-encoded bytecode
pub fn cmd_disasm(code: &str) -> CliResult<()> {
    let code = hex::decode(code.trim().trim_start_matches("0x"))?;

    println!("📜 Disassembly ({} bytes):", code.len());
    print!("{}", disassemble(&code));

    Ok(())
}

/// Show a persisted async context
pub fn cmd_inspect(config: &HostConfig, file: &Path) -> CliResult<()> {
    let content = fs::read_to_string(file)?;
    let ser: SerializableAsyncContext = serde_json::from_str(&content)?;
    let context = AsyncContext::from_serializable(ser, config.gas_schedule)?;

    println!("🔎 Async context of {}", display_address(context.address()));
    println!("   Caller: {}", display_address(context.caller()));
    println!("   Gas accumulated: {}", context.gas_accumulated());
    println!(
        "   Status: {}",
        if context.is_complete() { "complete" } else { "waiting" }
    );

    if context.groups().is_empty() {
        println!("\n📭 No call groups");
        return Ok(());
    }

    for group in context.groups() {
        println!("\n📂 Group '{}'", group.identifier());
        if group.has_callback() {
            println!(
                "   Callback: {} (locked {} gas, recovered {})",
                group.callback(),
                group.gas_locked(),
                group.gas_recovered()
            );
        }
        println!("   Pending calls: {}", group.pending_count());
        for call in group.calls() {
            let call_id = if call.call_id().is_empty() {
                "-".to_string()
            } else {
                hex::encode(call.call_id())
            };
            println!(
                "   └─ {} -> {} {:?}/{:?}",
                call_id,
                display_address(call.destination()),
                call.status(),
                call.execution_mode()
            );
            println!(
                "      data: {}",
                String::from_utf8_lossy(call.data())
            );
            println!(
                "      gas: {} + {} locked, callbacks: '{}' / '{}'",
                call.gas_limit(),
                call.gas_locked(),
                call.success_callback(),
                call.error_callback()
            );
        }
    }

    Ok(())
}
