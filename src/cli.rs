use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author = "sol-batch-transfer contributors")]
#[command(version = "0.1.0")]
#[command(about = "Batched SOL and SPL token distribution, collection and swaps on Solana")]
#[command(
    long_about = "Sends SOL or SPL tokens from one wallet to many, sweeps many wallets into one, \
    swaps through an aggregator and manages address lookup tables. Items run one at a time \
    and every outcome is reported."
)]
pub struct Cli {
    /// Path to config.yaml file
    #[arg(short, long, global = true, default_value = "config.yaml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send from one wallet to many recipients
    Distribute {
        /// Path to a distribute plan (see generate-config --plans)
        #[arg(short, long)]
        plan: PathBuf,
    },

    /// Sweep many wallets into one destination
    Collect {
        /// Path to a collect plan (see generate-config --plans)
        #[arg(short, long)]
        plan: PathBuf,
    },

    /// Send a single transfer
    Transfer {
        /// Path to the source keypair file
        #[arg(short, long)]
        keypair: PathBuf,

        /// Destination wallet address
        #[arg(long)]
        to: String,

        /// Amount in display units (SOL or whole tokens)
        #[arg(long)]
        amount: Decimal,

        /// SPL token mint; SOL is sent when omitted
        #[arg(long)]
        mint: Option<String>,

        /// Token decimals, read from the mint when omitted
        #[arg(long, requires = "mint")]
        decimals: Option<u8>,
    },

    /// Print SOL (and optionally token) balances for many wallets
    Balances {
        /// Wallet addresses
        addresses: Vec<String>,

        /// File with one address per line
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Also read balances of this SPL token mint
        #[arg(long)]
        mint: Option<String>,
    },

    /// Swap through the aggregator and submit the result
    Swap {
        /// Path to the signing keypair file
        #[arg(short, long)]
        keypair: PathBuf,

        #[arg(long)]
        input_mint: String,

        #[arg(long)]
        output_mint: String,

        /// Input amount in base units
        #[arg(long)]
        amount: u64,

        #[arg(long)]
        slippage_bps: Option<u16>,

        #[arg(long)]
        only_direct_routes: bool,

        /// Sign the aggregator's prebuilt transaction instead of assembling locally
        #[arg(long)]
        prebuilt: bool,

        #[arg(long)]
        exclude_compute_budget: bool,

        #[arg(long)]
        exclude_token_ledger: bool,

        #[arg(long)]
        exclude_setup: bool,

        #[arg(long)]
        exclude_cleanup: bool,
    },

    /// Create an address lookup table owned by the keypair
    CreateTable {
        /// Path to the authority keypair file, which also pays for the table
        #[arg(short, long)]
        keypair: PathBuf,
    },

    /// Add addresses to a lookup table, skipping ones it already holds
    ExtendTable {
        /// Path to the table authority keypair file
        #[arg(short, long)]
        keypair: PathBuf,

        /// Lookup table address
        #[arg(long)]
        table: String,

        /// Addresses to add
        addresses: Vec<String>,

        /// File with one address per line
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// List a lookup table's addresses, or look up one address in it
    ShowTable {
        /// Lookup table address
        #[arg(long)]
        table: String,

        /// Print only this address's index in the table
        #[arg(long)]
        address: Option<String>,
    },

    /// Close empty token accounts and return their rent
    ReclaimRent {
        /// Owner keypair files, one account is closed per owner
        #[arg(short, long = "keypair", required = true)]
        keypairs: Vec<PathBuf>,

        /// Mint of the token accounts to close
        #[arg(long)]
        mint: String,

        /// Where the rent goes; each owner gets its own rent back when omitted
        #[arg(long)]
        destination: Option<String>,
    },

    /// Generate a sample config file
    GenerateConfig {
        /// Path to output config file
        #[arg(short, long, default_value = "config.yaml")]
        output: PathBuf,

        /// Also write distribute.yaml and collect.yaml next to it
        #[arg(long)]
        plans: bool,
    },
}

pub fn parse_args() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_single_token_transfer() {
        let cli = Cli::try_parse_from([
            "sol-batch-transfer",
            "transfer",
            "--keypair",
            "id.json",
            "--to",
            "Dest",
            "--amount",
            "1.25",
            "--mint",
            "Mint",
            "--decimals",
            "6",
        ])
        .unwrap();

        assert_eq!(cli.config, PathBuf::from("config.yaml"));
        match cli.command {
            Commands::Transfer {
                amount,
                mint,
                decimals,
                ..
            } => {
                assert_eq!(amount, Decimal::new(125, 2));
                assert_eq!(mint.as_deref(), Some("Mint"));
                assert_eq!(decimals, Some(6));
            }
            _ => panic!("expected transfer"),
        }
    }

    #[test]
    fn decimals_without_mint_is_rejected() {
        let parsed = Cli::try_parse_from([
            "sol-batch-transfer",
            "transfer",
            "--keypair",
            "id.json",
            "--to",
            "Dest",
            "--amount",
            "1",
            "--decimals",
            "6",
        ]);

        assert!(parsed.is_err());
    }

    #[test]
    fn global_config_flag_follows_subcommand() {
        let cli = Cli::try_parse_from([
            "sol-batch-transfer",
            "balances",
            "Wallet1",
            "Wallet2",
            "--config",
            "other.yaml",
        ])
        .unwrap();

        assert_eq!(cli.config, PathBuf::from("other.yaml"));
        match cli.command {
            Commands::Balances { addresses, .. } => assert_eq!(addresses.len(), 2),
            _ => panic!("expected balances"),
        }
    }

    #[test]
    fn reclaim_rent_takes_repeated_keypairs() {
        let cli = Cli::try_parse_from([
            "sol-batch-transfer",
            "reclaim-rent",
            "-k",
            "a.json",
            "--keypair",
            "b.json",
            "--mint",
            "Mint",
        ])
        .unwrap();

        match cli.command {
            Commands::ReclaimRent {
                keypairs,
                mint,
                destination,
            } => {
                assert_eq!(keypairs, vec![PathBuf::from("a.json"), PathBuf::from("b.json")]);
                assert_eq!(mint, "Mint");
                assert_eq!(destination, None);
            }
            _ => panic!("expected reclaim-rent"),
        }
    }

    #[test]
    fn reclaim_rent_requires_a_keypair() {
        let parsed = Cli::try_parse_from(["sol-batch-transfer", "reclaim-rent", "--mint", "Mint"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn parses_table_commands() {
        let cli = Cli::try_parse_from([
            "sol-batch-transfer",
            "extend-table",
            "--keypair",
            "id.json",
            "--table",
            "Table",
            "Addr1",
            "Addr2",
        ])
        .unwrap();
        match cli.command {
            Commands::ExtendTable {
                table,
                addresses,
                file,
                ..
            } => {
                assert_eq!(table, "Table");
                assert_eq!(addresses, vec!["Addr1", "Addr2"]);
                assert!(file.is_none());
            }
            _ => panic!("expected extend-table"),
        }

        let cli = Cli::try_parse_from([
            "sol-batch-transfer",
            "show-table",
            "--table",
            "Table",
            "--address",
            "Addr1",
        ])
        .unwrap();
        match cli.command {
            Commands::ShowTable { table, address } => {
                assert_eq!(table, "Table");
                assert_eq!(address.as_deref(), Some("Addr1"));
            }
            _ => panic!("expected show-table"),
        }
    }
}
