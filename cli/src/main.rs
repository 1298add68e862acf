//! `vfc`: the command-line surface binding to the programmatic entry
//! points §6 requires (keygen, send, balance, dump, find, peers, resync,
//! mine, difficulty) plus a `node` subcommand that runs the long-lived
//! protocol engine.
//!
//! Per §7, every command prints a single line describing its outcome and
//! exits `0`; there are no distinct failure exit codes.

use std::net::{Ipv4Addr, UdpSocket};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use vfc_core::config::{Config, ConfigBuilder};
use vfc_core::constants::{self, opcode};
use vfc_core::crypto;
use vfc_core::ledger::LedgerStore;

#[derive(Parser)]
#[command(name = "vfc")]
#[command(about = "VFC full node and wallet CLI", version)]
struct Cli {
    /// Overrides the default data directory (`$VFCDIR` or `$HOME/.vfc`).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full node (UDP listener, admission workers, housekeeping).
    Node {
        #[arg(long)]
        master: bool,
        #[arg(long)]
        mine: bool,
        #[arg(long, default_value_t = 1)]
        mining_workers: usize,
        #[arg(long, default_value_t = constants::PORT)]
        port: u16,
    },
    /// Generates a fresh keypair and saves it under the data directory.
    Keygen {
        /// Deterministic seed (four u64 words) instead of OS randomness.
        #[arg(long, num_args = 4)]
        seed: Option<Vec<u64>>,
    },
    /// Sends a signed transaction, optionally broadcasting it to peers.
    Send {
        /// Base58 recipient public key. Ignored if `--self` is given.
        #[arg(long)]
        to: Option<String>,
        #[arg(long)]
        #[arg(conflicts_with = "to")]
        self_transfer: bool,
        /// Amount in 1/1000 coin units.
        #[arg(long)]
        amount: u32,
        #[arg(long)]
        broadcast: bool,
    },
    /// Prints the spendable balance of the local wallet.
    Balance,
    /// Dumps every ledger record as `index uid from to amount`.
    Dump,
    /// Finds a record by uid.
    Find {
        uid: u64,
    },
    /// Lists known peers.
    Peers,
    /// Sends a non-blocking replay request to the master and known peers.
    Resync,
    /// Runs the mining loop in the foreground.
    Mine {
        #[arg(long, default_value_t = 1)]
        workers: usize,
    },
    /// Prints this node's configured local difficulty.
    GetDifficulty,
    /// Sets this node's local difficulty (clamped to the protocol range).
    SetDifficulty {
        value: f32,
    },
}

fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let mut builder = ConfigBuilder::new();
    if let Some(dir) = cli.data_dir {
        builder = builder.data_dir(dir);
    }
    let config = builder.finish();

    match cli.command {
        Commands::Node { master, mine, mining_workers, port } => cmd_node(config, master, mine, mining_workers, port),
        Commands::Keygen { seed } => cmd_keygen(config, seed),
        Commands::Send { to, self_transfer, amount, broadcast } => cmd_send(config, to, self_transfer, amount, broadcast),
        Commands::Balance => cmd_balance(config),
        Commands::Dump => cmd_dump(config),
        Commands::Find { uid } => cmd_find(config, uid),
        Commands::Peers => cmd_peers(config),
        Commands::Resync => cmd_resync(config),
        Commands::Mine { workers } => cmd_mine(config, workers),
        Commands::GetDifficulty => cmd_get_difficulty(config),
        Commands::SetDifficulty { value } => cmd_set_difficulty(config, value),
    }
}

fn cmd_node(mut config: Config, master: bool, mine: bool, mining_workers: usize, port: u16) {
    config.is_master = master;
    config.listen_port = port;
    if let Err(e) = vfc_node::run(config, mine, mining_workers) {
        println!("node exited: {e}");
    }
}

fn cmd_keygen(config: Config, seed: Option<Vec<u64>>) {
    let keypair = match seed {
        Some(words) if words.len() == 4 => vfc_wallet::generate_seeded([words[0], words[1], words[2], words[3]]),
        Some(_) => {
            println!("seed requires exactly four values");
            return;
        }
        None => vfc_wallet::generate(),
    };
    match vfc_wallet::save_keypair(&config.data_dir, &keypair) {
        Ok(()) => println!("generated keypair: {}", crypto::base58_encode(&keypair.public_bytes())),
        Err(e) => println!("failed to save keypair: {e}"),
    }
}

fn cmd_send(config: Config, to: Option<String>, self_transfer: bool, amount: u32, broadcast: bool) {
    if amount < 1 {
        println!("amount must be at least 1 (in 1/1000 coin units)");
        return;
    }
    let keypair = match vfc_wallet::load_keypair(&config.data_dir) {
        Ok(kp) => kp,
        Err(e) => {
            println!("no wallet loaded: {e}");
            return;
        }
    };

    let recipient = if self_transfer {
        keypair.public_bytes()
    } else {
        match to.as_deref().map(crypto::base58_decode) {
            Some(Ok(bytes)) if bytes.len() == constants::PUBKEY_SIZE => {
                let mut out = [0u8; constants::PUBKEY_SIZE];
                out.copy_from_slice(&bytes);
                out
            }
            _ => {
                println!("missing or invalid --to recipient");
                return;
            }
        }
    };

    let ledger = match LedgerStore::open(config.blocks_path()) {
        Ok(l) => l,
        Err(e) => {
            println!("failed to open ledger: {e}");
            return;
        }
    };

    let uid = crypto::crc64(0, crypto::base58_encode(&keypair.public_bytes()).as_bytes());
    let tx = vfc_wallet::build_transaction(&keypair, recipient, amount, uid);

    let mut rexi = vfc_core::uniqueness::RecentExecRing::new();
    match vfc_core::admission::admit(&tx, &ledger, &mut rexi, config.node_difficulty) {
        Ok(outcome) => println!("send accepted: {outcome:?}"),
        Err(e) => {
            println!("send rejected: {e}");
            return;
        }
    }

    if broadcast {
        broadcast_tx(&config, &tx);
    }
}

fn broadcast_tx(config: &Config, tx: &vfc_core::record::TxRecord) {
    let Ok(socket) = UdpSocket::bind(("0.0.0.0", 0)) else { return };
    let mut packet = vec![opcode::NEW_TX];
    packet.extend_from_slice(&[0, 0, 0, 0]);
    packet.extend_from_slice(&tx.to_bytes());
    let master: Ipv4Addr = constants::MASTER_IP.parse().expect("hardcoded master ip is valid");
    let _ = socket.send_to(&packet, (master, config.listen_port));
}

fn cmd_balance(config: Config) {
    let keypair = match vfc_wallet::load_keypair(&config.data_dir) {
        Ok(kp) => kp,
        Err(e) => {
            println!("no wallet loaded: {e}");
            return;
        }
    };
    let ledger = match LedgerStore::open(config.blocks_path()) {
        Ok(l) => l,
        Err(e) => {
            println!("failed to open ledger: {e}");
            return;
        }
    };
    match vfc_wallet::balance(&ledger, &keypair, config.node_difficulty) {
        Ok(bal) => println!("balance: {bal}"),
        Err(e) => println!("failed to compute balance: {e}"),
    }
}

fn cmd_dump(config: Config) {
    let ledger = match LedgerStore::open(config.blocks_path()) {
        Ok(l) => l,
        Err(e) => {
            println!("failed to open ledger: {e}");
            return;
        }
    };
    let result = ledger.scan(|idx, rec| {
        println!(
            "{idx} uid={} from={} to={} amount={}",
            rec.uid,
            crypto::base58_encode(&rec.from),
            crypto::base58_encode(&rec.to),
            rec.amount
        );
    });
    if let Err(e) = result {
        println!("scan failed: {e}");
    }
}

fn cmd_find(config: Config, uid: u64) {
    let ledger = match LedgerStore::open(config.blocks_path()) {
        Ok(l) => l,
        Err(e) => {
            println!("failed to open ledger: {e}");
            return;
        }
    };
    let mut found = None;
    let _ = ledger.scan(|idx, rec| {
        if rec.uid == uid && found.is_none() {
            found = Some((idx, *rec));
        }
    });
    match found {
        Some((idx, rec)) => println!("found at index {idx}: amount={} to={}", rec.amount, crypto::base58_encode(&rec.to)),
        None => println!("uid {uid} not found"),
    }
}

fn cmd_peers(config: Config) {
    let registry = vfc_core::peers::PeerRegistry::new();
    if let Err(e) = registry.load(&config.data_dir) {
        println!("failed to load peers: {e}");
        return;
    }
    for ip in registry.all_except_master() {
        println!("{ip}");
    }
    println!("living: {}", registry.count_living());
}

fn cmd_resync(config: Config) {
    let Ok(socket) = UdpSocket::bind(("0.0.0.0", 0)) else {
        println!("failed to bind ephemeral socket for resync");
        return;
    };
    let master: Ipv4Addr = constants::MASTER_IP.parse().expect("hardcoded master ip is valid");
    let _ = socket.send_to(&[opcode::REPLAY_REQUEST], (master, config.listen_port));
    println!("resync requested");
}

fn cmd_mine(config: Config, workers: usize) {
    println!("mining with {workers} worker(s); press ctrl-c to stop");
    let _ = vfc_node::run(
        Config { is_master: false, ..config },
        true,
        workers,
    );
}

fn cmd_get_difficulty(config: Config) {
    println!("local difficulty: {}", config.node_difficulty);
}

fn cmd_set_difficulty(config: Config, value: f32) {
    let clamped = value.clamp(constants::MIN_NODE_DIFFICULTY, constants::MAX_NODE_DIFFICULTY);
    match std::fs::write(config.difficulty_path(), clamped.to_le_bytes()) {
        Ok(()) => println!("local difficulty set to {clamped}"),
        Err(e) => println!("failed to persist difficulty: {e}"),
    }
}
