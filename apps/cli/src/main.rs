mod prompt;

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail, ensure};
use clap::{Args, Parser, Subcommand, ValueEnum};
use skywallet_core::protocol::messages::{
    BitcoinTxInput, BitcoinTxOutput, SkycoinTransactionInput, SkycoinTransactionOutput, TxAckInput,
    TxAckOutput,
};
use skywallet_core::{
    BitcoinTransaction, Device, DeviceConfig, DeviceType, EntropySource, Settings,
    SkycoinTransaction,
};
use tracing::{error, info};

use crate::prompt::TerminalPrompts;

#[derive(Parser, Debug)]
#[command(author, version, about = "Skywallet hardware wallet tool", long_about = None)]
struct Cli {
    /// Path to a TOML device configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Device to talk to: USB or EMULATOR (overrides the config file)
    #[arg(long, global = true, env = "DEVICE_TYPE")]
    device_type: Option<DeviceType>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ask the device for its features
    Features,

    /// Send a ping and print the echo
    Ping {
        #[arg(long, default_value = "ping")]
        message: String,
    },

    /// Check whether a device answers
    Connected,

    /// Generate addresses from the device's seed
    AddressGen {
        /// Number of addresses to generate
        #[arg(long, short = 'n', default_value_t = 1)]
        address_n: u32,

        /// Index of the first address
        #[arg(long, short = 's', default_value_t = 0)]
        start_index: u32,

        /// Show the address on the device and wait for confirmation
        #[arg(long)]
        confirm_address: bool,
    },

    /// Change device settings
    ApplySettings {
        #[arg(long)]
        label: Option<String>,

        #[arg(long)]
        language: Option<String>,

        #[arg(long)]
        use_passphrase: Option<bool>,
    },

    /// Back up the seed by writing down the words shown on the device
    Backup,

    /// Restore a seed, one word at a time
    Recovery {
        #[arg(long, default_value_t = 12)]
        word_count: u32,

        #[arg(long)]
        use_passphrase: bool,

        /// Only check the words against the stored seed
        #[arg(long)]
        dry_run: bool,
    },

    /// Erase the seed and all settings
    Wipe,

    /// Set or change the PIN
    SetPin,

    /// Remove the PIN
    RemovePin,

    /// Let the device generate a new seed
    GenerateMnemonic {
        #[arg(long, default_value_t = 12)]
        word_count: u32,

        #[arg(long)]
        use_passphrase: bool,
    },

    /// Load a seed into the device
    SetMnemonic {
        #[arg(long)]
        mnemonic: String,
    },

    /// Sign a message with the key at an address index
    SignMessage {
        #[arg(long, default_value_t = 0)]
        address_n: u32,

        #[arg(long)]
        message: String,
    },

    /// Check that a signature over a message belongs to an address
    CheckMessageSignature {
        #[arg(long)]
        address: String,

        #[arg(long)]
        message: String,

        #[arg(long)]
        signature: String,
    },

    /// Sign a transaction
    TransactionSign(TransactionArgs),

    /// Flash a new firmware image (USB only)
    FirmwareUpdate {
        #[arg(long, short)]
        file: PathBuf,
    },

    /// Write hardware RNG output to a file
    GetRawEntropy(EntropyArgs),

    /// Write mixed device entropy to a file
    GetMixedEntropy(EntropyArgs),

    /// Abort the operation the device is waiting on
    Cancel,

    /// Write the effective configuration to a TOML file
    SaveConfig { path: PathBuf },
}

#[derive(Args, Debug)]
struct EntropyArgs {
    /// Total number of entropy bytes to read
    #[arg(long)]
    entropy_bytes: usize,

    /// File to write the entropy to
    #[arg(long, short)]
    out_file: PathBuf,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum CoinType {
    Sky,
    Btc,
}

#[derive(Args, Debug)]
struct TransactionArgs {
    #[arg(long, value_enum, default_value_t = CoinType::Sky, env = "COIN_TYPE")]
    coin_type: CoinType,

    /// Input hash (SKY), repeat per input
    #[arg(long)]
    input_hash: Vec<String>,

    /// Hex-encoded previous transaction hash (BTC), repeat per input
    #[arg(long)]
    prev_hash: Vec<String>,

    /// Wallet index of each input
    #[arg(long)]
    input_index: Vec<u32>,

    /// Output address, repeat per output
    #[arg(long)]
    output_address: Vec<String>,

    /// Coins per output
    #[arg(long)]
    coin: Vec<u64>,

    /// Hours per output (SKY)
    #[arg(long)]
    hour: Vec<u64>,

    /// Wallet index of an output that returns change
    #[arg(long)]
    address_index: Vec<u32>,

    /// Send the whole transaction in one message (SKY, small transactions)
    #[arg(long)]
    single_shot: bool,
}

fn main() {
    let cli = Cli::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if cli.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install logger: {e}");
    }

    if let Err(e) = run(cli) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> Result<DeviceConfig> {
    let mut config = match &cli.config {
        Some(path) => DeviceConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => DeviceConfig::default(),
    };
    if let Some(device_type) = cli.device_type {
        config.device_type = device_type;
    }
    Ok(config)
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    info!(device_type = %config.device_type, "Starting Skywallet tool");
    let device = Device::from_config(config).with_prompts(Arc::new(TerminalPrompts));

    match cli.command {
        Command::Features => {
            let features = device.get_features()?;
            println!("Vendor:          {}", features.vendor.as_deref().unwrap_or_default());
            println!("Model:           {}", features.model.as_deref().unwrap_or_default());
            println!("Firmware:        {}", features.version());
            println!("Device ID:       {}", features.device_id.as_deref().unwrap_or_default());
            println!("Label:           {}", features.label.as_deref().unwrap_or_default());
            println!("Initialized:     {}", features.initialized.unwrap_or(false));
            println!("PIN protection:  {}", features.pin_protection.unwrap_or(false));
            println!("Passphrase:      {}", features.passphrase_protection.unwrap_or(false));
            println!("Needs backup:    {}", features.needs_backup.unwrap_or(false));
            if let Some(flags) = features.firmware_flags() {
                println!("Firmware flags:  {flags}");
            }
        }
        Command::Ping { message } => println!("{}", device.ping(&message)?),
        Command::Connected => println!("{}", device.connected()),
        Command::AddressGen {
            address_n,
            start_index,
            confirm_address,
        } => {
            for address in device.address_gen(address_n, start_index, confirm_address)? {
                println!("{address}");
            }
        }
        Command::ApplySettings {
            label,
            language,
            use_passphrase,
        } => {
            let settings = Settings {
                label,
                language,
                use_passphrase,
            };
            println!("{}", device.apply_settings(&settings)?);
        }
        Command::Backup => println!("{}", device.backup()?),
        Command::Recovery {
            word_count,
            use_passphrase,
            dry_run,
        } => println!("{}", device.recovery(word_count, use_passphrase, dry_run)?),
        Command::Wipe => println!("{}", device.wipe()?),
        Command::SetPin => println!("{}", device.change_pin(false)?),
        Command::RemovePin => println!("{}", device.change_pin(true)?),
        Command::GenerateMnemonic {
            word_count,
            use_passphrase,
        } => println!("{}", device.generate_mnemonic(word_count, use_passphrase)?),
        Command::SetMnemonic { mnemonic } => println!("{}", device.set_mnemonic(&mnemonic)?),
        Command::SignMessage { address_n, message } => {
            println!("{}", device.sign_message(address_n, &message)?)
        }
        Command::CheckMessageSignature {
            address,
            message,
            signature,
        } => println!(
            "{}",
            device.check_message_signature(&address, &message, &signature)?
        ),
        Command::TransactionSign(args) => {
            for signature in sign_transaction(&device, &args)? {
                println!("{signature}");
            }
        }
        Command::FirmwareUpdate { file } => {
            let firmware = std::fs::read(&file)
                .with_context(|| format!("Failed to read firmware {}", file.display()))?;
            info!(path = %file.display(), len = firmware.len(), "Uploading firmware");
            device.firmware_upload(&firmware)?;
            info!("Firmware sent, confirm on the device");
        }
        Command::GetRawEntropy(args) => save_entropy(&device, EntropySource::Raw, &args)?,
        Command::GetMixedEntropy(args) => save_entropy(&device, EntropySource::Mixed, &args)?,
        Command::Cancel => println!("{}", device.cancel()?),
        Command::SaveConfig { path } => {
            device
                .config()
                .save_to_file(&path)
                .with_context(|| format!("Failed to write config {}", path.display()))?;
            info!(path = %path.display(), "Configuration saved");
        }
    }
    Ok(())
}

fn save_entropy(device: &Device, source: EntropySource, args: &EntropyArgs) -> Result<()> {
    ensure!(args.entropy_bytes > 0, "entropy-bytes must be at least 1");
    let file = File::create(&args.out_file)
        .with_context(|| format!("Failed to create {}", args.out_file.display()))?;
    let mut out = BufWriter::new(file);

    info!(source = %source, bytes = args.entropy_bytes, path = %args.out_file.display(), "Getting entropy from device");
    let written = device.save_entropy(source, args.entropy_bytes, &mut out)?;
    out.into_inner()
        .map_err(|e| e.into_error())?
        .sync_all()?;

    ensure!(
        written >= args.entropy_bytes,
        "Not enough entropy saved in {}: got {} of {} bytes",
        args.out_file.display(),
        written,
        args.entropy_bytes
    );
    Ok(())
}

fn sign_transaction(device: &Device, args: &TransactionArgs) -> Result<Vec<String>> {
    ensure!(
        args.output_address.len() == args.coin.len(),
        "Every given output should have a coin value"
    );
    match args.coin_type {
        CoinType::Sky => {
            ensure!(
                args.prev_hash.is_empty(),
                "Coin type SKY doesn't need previous hash"
            );
            ensure!(
                args.input_hash.len() == args.input_index.len(),
                "Every given input hash should have an input index"
            );
            ensure!(
                args.output_address.len() == args.hour.len(),
                "Every given output should have an hour value"
            );
            if args.single_shot {
                let (inputs, outputs) = single_shot_transaction(args);
                Ok(device.transaction_sign(&inputs, &outputs)?)
            } else {
                Ok(device.sign_skycoin_transaction(&skycoin_transaction(args))?)
            }
        }
        CoinType::Btc => {
            ensure!(
                args.input_hash.is_empty(),
                "Coin type BTC doesn't need input hash"
            );
            if args.single_shot {
                bail!("Single-shot signing is only available for SKY");
            }
            ensure!(
                args.prev_hash.len() == args.input_index.len(),
                "Every given input index should have a previous transaction hash"
            );
            Ok(device.sign_bitcoin_transaction(&bitcoin_transaction(args)?)?)
        }
    }
}

fn skycoin_transaction(args: &TransactionArgs) -> SkycoinTransaction {
    let inputs = args
        .input_hash
        .iter()
        .zip(&args.input_index)
        .map(|(hash, index)| TxAckInput {
            address_n: vec![*index],
            hash_in: hash.clone(),
        })
        .collect();
    let outputs = args
        .output_address
        .iter()
        .enumerate()
        .map(|(i, address)| TxAckOutput {
            address: address.clone(),
            address_n: args.address_index.get(i).map(|n| vec![*n]).unwrap_or_default(),
            coins: args.coin[i],
            hours: args.hour[i],
        })
        .collect();
    SkycoinTransaction {
        inputs,
        outputs,
        version: 1,
        lock_time: 0,
        tx_hash: None,
    }
}

fn single_shot_transaction(
    args: &TransactionArgs,
) -> (Vec<SkycoinTransactionInput>, Vec<SkycoinTransactionOutput>) {
    let inputs = args
        .input_hash
        .iter()
        .zip(&args.input_index)
        .map(|(hash, index)| SkycoinTransactionInput {
            hash_in: hash.clone(),
            index: Some(*index),
        })
        .collect();
    let outputs = args
        .output_address
        .iter()
        .enumerate()
        .map(|(i, address)| SkycoinTransactionOutput {
            address: address.clone(),
            coin: args.coin[i],
            hour: args.hour[i],
            address_index: args.address_index.get(i).copied(),
        })
        .collect();
    (inputs, outputs)
}

fn bitcoin_transaction(args: &TransactionArgs) -> Result<BitcoinTransaction> {
    let inputs = args
        .prev_hash
        .iter()
        .zip(&args.input_index)
        .map(|(hash, index)| {
            let prev_hash = hex::decode(hash)
                .with_context(|| format!("Previous hash {hash:?} is not valid hex"))?;
            Ok(BitcoinTxInput {
                address_n: *index,
                prev_hash,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let outputs = args
        .output_address
        .iter()
        .enumerate()
        .map(|(i, address)| BitcoinTxOutput {
            address: address.clone(),
            coin: args.coin[i],
            address_index: args.address_index.get(i).copied(),
        })
        .collect();
    Ok(BitcoinTransaction {
        inputs,
        outputs,
        version: 1,
        lock_time: 0,
        tx_hash: None,
    })
}
