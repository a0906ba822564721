mod cli;

use anyhow::{Context, Result, anyhow};
use cli::{Commands, parse_args};
use indicatif::{ProgressBar, ProgressStyle};
use sol_batch_transfer::address::parse_address;
use sol_batch_transfer::assembler::{AssemblyContext, InstructionAssembler, InstructionFilter};
use sol_batch_transfer::balances::{TokenQuery, fetch_balances};
use sol_batch_transfer::config::{
    CollectPlan, Config, DistributePlan, SAMPLE_COLLECT_PLAN, SAMPLE_CONFIG,
    SAMPLE_DISTRIBUTE_PLAN, load_address_list, load_keypair,
};
use sol_batch_transfer::lookup_table::LookupTableManager;
use sol_batch_transfer::orchestrator::ReclaimRequest;
use sol_batch_transfer::report::{BalanceTable, ResultsTable};
use sol_batch_transfer::submitter::TransactionSubmitter;
use sol_batch_transfer::swap::{
    JupiterClient, QuoteParams, SwapRequest, SwapTransactionConfig, build_serialized,
    quote_and_decompose,
};
use sol_batch_transfer::{Asset, BatchOrchestrator, BatchRequest, Ledger, RpcLedger};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signer;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = parse_args();

    // Sample files need neither config nor RPC
    if let Commands::GenerateConfig { output, plans } = &cli.command {
        tracing_subscriber::fmt::init();
        return generate_config(output, *plans);
    }

    // Config
    let config = Config::load_or_default(&cli.config)
        .context(format!("Failed to load config from {:?}", cli.config))?;
    init_tracing(&config.log_level);
    info!("Using RPC endpoint {}", config.rpc_url);

    // RPC
    let ledger: Arc<dyn Ledger> = Arc::new(RpcLedger::new(
        config.rpc_url.clone(),
        config.commitment.to_config(),
        config.rpc_timeout(),
    ));

    match cli.command {
        Commands::Distribute { plan } => {
            let request = DistributePlan::load(&plan)
                .context(format!("Failed to load plan from {:?}", plan))?
                .into_request()?;
            run_batch(&config, ledger, request).await
        }

        Commands::Collect { plan } => {
            let request = CollectPlan::load(&plan)
                .context(format!("Failed to load plan from {:?}", plan))?
                .into_request()?;
            run_batch(&config, ledger, request).await
        }

        Commands::Transfer {
            keypair,
            to,
            amount,
            mint,
            decimals,
        } => {
            let source = load_keypair(&keypair)?;
            let asset = match mint {
                Some(mint) => Asset::Token { mint, decimals },
                None => Asset::Native,
            };
            run_batch(&config, ledger, BatchRequest::single(source, to, amount, asset)).await
        }

        Commands::Balances {
            mut addresses,
            file,
            mint,
        } => {
            if let Some(path) = &file {
                addresses.extend(load_address_list(path)?);
            }
            if addresses.is_empty() {
                return Err(anyhow!("No wallet addresses given"));
            }

            let token = match &mint {
                Some(mint) => {
                    let mint = Pubkey::from_str(mint)
                        .map_err(|e| anyhow!("Invalid mint address {}: {}", mint, e))?;
                    let decimals = ledger
                        .mint_decimals(&mint)
                        .await
                        .context("Failed to read mint decimals")?;
                    Some(TokenQuery { mint, decimals })
                }
                None => None,
            };

            let sheet = fetch_balances(ledger, &addresses, config.balance_batch_size, token).await;
            println!(
                "{}",
                BalanceTable {
                    sheet: &sheet,
                    token_label: mint.as_deref().map(|_| "Token balance"),
                }
            );
            Ok(())
        }

        Commands::Swap {
            keypair,
            input_mint,
            output_mint,
            amount,
            slippage_bps,
            only_direct_routes,
            prebuilt,
            exclude_compute_budget,
            exclude_token_ledger,
            exclude_setup,
            exclude_cleanup,
        } => {
            let signer = load_keypair(&keypair)?;
            let client = JupiterClient::new(config.swap_api_url.clone())?;
            let submitter = TransactionSubmitter::new(Arc::clone(&ledger), config.submitter_config());

            let request = SwapRequest {
                quote: QuoteParams {
                    input_mint,
                    output_mint,
                    amount,
                    slippage_bps,
                    only_direct_routes: only_direct_routes.then_some(true),
                    as_legacy_transaction: (!config.use_versioned).then_some(true),
                    ..Default::default()
                },
                user: signer.pubkey(),
                config: SwapTransactionConfig {
                    wrap_and_unwrap_sol: Some(true),
                    dynamic_compute_unit_limit: Some(true),
                    as_legacy_transaction: (!config.use_versioned).then_some(true),
                    compute_unit_price_micro_lamports: (config.priority_fee_micro_lamports > 0)
                        .then_some(config.priority_fee_micro_lamports),
                    ..Default::default()
                },
            };

            // Submit
            let receipt = if prebuilt {
                let swap = build_serialized(&client, &request).await?.decode()?;
                info!(
                    "Aggregator built a {} transaction, priority fee {} lamports",
                    if swap.transaction.is_legacy() { "legacy" } else { "v0" },
                    swap.prioritization_fee_lamports.unwrap_or(0)
                );
                submitter
                    .submit_decoded(swap.transaction, swap.last_valid_block_height, &[&signer])
                    .await?
            } else {
                let payload = quote_and_decompose(&client, &request).await?;
                let context = AssemblyContext {
                    payer: signer.pubkey(),
                    format: config.message_format(),
                    address_tables: config.address_table_keys()?,
                    ..Default::default()
                };
                let filter = InstructionFilter {
                    include_compute_budget: !exclude_compute_budget,
                    include_token_ledger: !exclude_token_ledger,
                    include_setup: !exclude_setup,
                    include_cleanup: !exclude_cleanup,
                };
                let transaction = InstructionAssembler::new(ledger)
                    .build_from_payload(&payload, &context, filter)
                    .await?;
                submitter.submit(&transaction, &[&signer]).await?
            };

            println!(
                "Swap confirmed: {} (fee {} lamports)",
                receipt.signature, receipt.fee_lamports
            );
            Ok(())
        }

        Commands::CreateTable { keypair } => {
            let authority = load_keypair(&keypair)?;
            let manager = LookupTableManager::new(ledger, config.settings()?);
            let created = manager.create(&authority).await?;
            println!(
                "Lookup table {} created ({})",
                created.table, created.receipt.signature
            );
            Ok(())
        }

        Commands::ExtendTable {
            keypair,
            table,
            mut addresses,
            file,
        } => {
            if let Some(path) = &file {
                addresses.extend(load_address_list(path)?);
            }
            let table = parse_address(&table).map_err(|e| anyhow!("Invalid table address: {}", e))?;
            let addresses = addresses
                .iter()
                .map(|address| parse_address(address).map_err(|e| anyhow!("{}: {}", address, e)))
                .collect::<Result<Vec<_>>>()?;
            if addresses.is_empty() {
                return Err(anyhow!("No addresses given"));
            }

            let authority = load_keypair(&keypair)?;
            let manager = LookupTableManager::new(ledger, config.settings()?);
            let extension = manager.extend(&table, &authority, &addresses).await?;
            println!(
                "Added {} addresses to {} in {} transactions ({} already present)",
                extension.added.len(),
                table,
                extension.receipts.len(),
                extension.already_present
            );
            Ok(())
        }

        Commands::ShowTable { table, address } => {
            let table = parse_address(&table).map_err(|e| anyhow!("Invalid table address: {}", e))?;
            let manager = LookupTableManager::new(ledger, config.settings()?);

            match address {
                Some(address) => {
                    let address =
                        parse_address(&address).map_err(|e| anyhow!("Invalid address: {}", e))?;
                    match manager.find(&table, &address).await? {
                        Some(index) => println!("{} is at index {} of {}", address, index, table),
                        None => println!("{} is not in {}", address, table),
                    }
                }
                None => {
                    for (index, member) in manager.addresses(&table).await?.iter().enumerate() {
                        println!("{:>3}  {}", index, member);
                    }
                }
            }
            Ok(())
        }

        Commands::ReclaimRent {
            keypairs,
            mint,
            destination,
        } => {
            let owners = keypairs
                .iter()
                .map(load_keypair)
                .collect::<Result<Vec<_>>>()?;
            let request = BatchRequest::Reclaim(ReclaimRequest {
                owners,
                mint,
                rent_destination: destination,
            });
            run_batch(&config, ledger, request).await
        }

        Commands::GenerateConfig { .. } => Ok(()),
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run_batch(config: &Config, ledger: Arc<dyn Ledger>, request: BatchRequest) -> Result<()> {
    let progress = ProgressBar::new(0);
    if let Ok(style) =
        ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
    {
        progress.set_style(style);
    }

    let orchestrator =
        BatchOrchestrator::new(ledger, config.settings()?).with_progress(progress.clone());
    let report = orchestrator.run(&request).await?;
    progress.finish_and_clear();

    println!("{}", ResultsTable(&report));
    Ok(())
}

fn generate_config(output: &Path, plans: bool) -> Result<()> {
    write_sample(output, SAMPLE_CONFIG)?;
    info!("Sample config generated at {:?}", output);

    if plans {
        let dir = output.parent().unwrap_or_else(|| Path::new("."));
        for (name, contents) in [
            ("distribute.yaml", SAMPLE_DISTRIBUTE_PLAN),
            ("collect.yaml", SAMPLE_COLLECT_PLAN),
        ] {
            let path = dir.join(name);
            write_sample(&path, contents)?;
            info!("Sample plan generated at {:?}", path);
        }
    }
    Ok(())
}

fn write_sample(path: &Path, contents: &str) -> Result<()> {
    let mut file = File::create(path).context(format!("Failed to create {:?}", path))?;
    file.write_all(contents.as_bytes())
        .context(format!("Failed to write {:?}", path))?;
    Ok(())
}
