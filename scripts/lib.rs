//! Deployment script for the RealEstateX contract

use std::{ffi::OsString, fmt::Display, io::Write, path::PathBuf, time::Duration};

use clap::Parser;
use helpers::{
    setup_client, AccountCreationConfig, ClientConfig, CommitPolicy, ContractDeployer,
    MidenDeployer, Network,
};
use miden_client::account::{StorageMap, StorageSlot};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

pub const CONTRACT_NAME: &str = "RealEstateX";

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;

#[derive(Parser, Debug)]
#[command(name = "deploy_real_estate_x")]
#[command(about = "Deploy the RealEstateX contract and print its address")]
pub struct DeployArgs {
    /// Network to deploy to
    #[arg(long, env = "MIDEN_NETWORK", default_value = "testnet")]
    pub network: Network,

    /// Explicit node RPC url, overrides --network
    #[arg(long, env = "MIDEN_RPC_URL")]
    pub rpc_url: Option<String>,

    /// Directory of the filesystem keystore
    #[arg(long, env = "MIDEN_KEYSTORE", default_value = "./keystore")]
    pub keystore: PathBuf,

    /// Path of the client's sqlite store
    #[arg(long, env = "MIDEN_STORE", default_value = "./store.sqlite3")]
    pub store: PathBuf,

    /// Directory holding the contract crates
    #[arg(long, env = "CONTRACTS_DIR", default_value = "../contracts")]
    pub contracts_dir: PathBuf,

    /// Seconds between confirmation polls
    #[arg(long, default_value_t = 2)]
    pub poll_interval_secs: u64,

    /// Confirmation polls before giving up
    #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_polls: u32,

    /// Enable debug logging
    #[arg(long, env = "DEPLOY_DEBUG")]
    pub debug: bool,
}

impl DeployArgs {
    pub fn client_config(&self) -> helpers::Result<ClientConfig> {
        let config = ClientConfig {
            keystore_path: self.keystore.clone(),
            store_path: self.store.clone(),
            ..ClientConfig::for_network(self.network)
        };
        match &self.rpc_url {
            Some(url) => config.with_rpc_url(url),
            None => Ok(config),
        }
    }

    pub fn commit_policy(&self) -> CommitPolicy {
        CommitPolicy {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            max_attempts: self.max_polls,
        }
    }
}

/// Parse command line and environment settings.
///
/// `--help` and `--version` are written to `out` and yield exit code 0; any other parse
/// failure goes through [`report_failure`]. `Err` carries the exit code to stop with.
pub fn parse_args<I, T, O, E>(args: I, out: &mut O, err: &mut E) -> Result<DeployArgs, u8>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
    O: Write,
    E: Write,
{
    match DeployArgs::try_parse_from(args) {
        Ok(args) => Ok(args),
        Err(e) if !e.use_stderr() => {
            let _ = write!(out, "{}", e.render());
            Err(EXIT_SUCCESS)
        }
        Err(e) => {
            let rendered = e.render().to_string();
            let message = rendered.strip_prefix("error: ").unwrap_or(&rendered).trim_end();
            Err(report_failure(err, &message))
        }
    }
}

/// Storage layout of the RealEstateX component: property owners in slot 0, counters in slot 1.
pub fn real_estate_x_account_config() -> AccountCreationConfig {
    AccountCreationConfig {
        storage_slots: vec![
            StorageSlot::Map(StorageMap::new()),
            StorageSlot::Map(StorageMap::new()),
        ],
        ..Default::default()
    }
}

/// Connect to the node selected by `args` and prepare a deployer for the contracts directory.
pub async fn connect(args: &DeployArgs) -> helpers::Result<MidenDeployer> {
    let config = args.client_config()?;
    let setup = setup_client(&config).await?;

    Ok(MidenDeployer::new(setup.client, args.contracts_dir.clone())
        .with_account_config(real_estate_x_account_config())
        .with_commit_policy(args.commit_policy()))
}

/// Deploy [`CONTRACT_NAME`] and report the outcome.
///
/// The address line goes to `out` only after the deployer has confirmed the deployment;
/// failures go to `err`. Returns the process exit code.
pub async fn run<D, O, E>(deployer: &mut D, network: &str, out: &mut O, err: &mut E) -> u8
where
    D: ContractDeployer + ?Sized,
    O: Write,
    E: Write,
{
    let address = match deployer.deploy(CONTRACT_NAME).await {
        Ok(address) => address,
        Err(e) => return report_failure(err, &e),
    };
    info!(contract = CONTRACT_NAME, %address, "deployment confirmed");

    match writeln!(out, "{CONTRACT_NAME} deployed to {network} at address: {address}") {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => report_failure(err, &e),
    }
}

pub fn report_failure<E: Write>(err: &mut E, cause: &dyn Display) -> u8 {
    debug!(contract = CONTRACT_NAME, error = %cause, "deployment failed");
    // Nothing left to report to if stderr itself is gone
    let _ = writeln!(err, "Error: {cause}");
    EXIT_FAILURE
}

pub fn default_log_filter(debug: bool) -> &'static str {
    if debug {
        "deploy_real_estate_x=debug,scripts=debug,helpers=debug,warn"
    } else {
        "warn"
    }
}

/// Logs go to stderr so stdout only ever carries the address line.
pub fn init_logging(debug: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_log_filter(debug)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .compact()
        .try_init();
}

#[cfg(test)]
mod tests {
    use std::{
        cell::RefCell,
        io,
        rc::Rc,
        sync::{Arc, Mutex},
    };

    use async_trait::async_trait;
    use helpers::{ContractAddress, DeployError};

    use super::*;

    const FIXED_ADDRESS: &str = "0xabc0000000000000000000000000de";

    type EventLog = Rc<RefCell<Vec<String>>>;

    /// Deployer that records every call and answers with a canned result.
    struct FakeDeployer {
        outcome: fn() -> helpers::Result<ContractAddress>,
        calls: Vec<String>,
        log: EventLog,
    }

    impl FakeDeployer {
        fn new(outcome: fn() -> helpers::Result<ContractAddress>) -> Self {
            Self {
                outcome,
                calls: vec![],
                log: EventLog::default(),
            }
        }
    }

    #[async_trait(?Send)]
    impl ContractDeployer for FakeDeployer {
        async fn deploy(&mut self, contract_name: &str) -> helpers::Result<ContractAddress> {
            self.calls.push(contract_name.to_string());
            tokio::task::yield_now().await;
            self.log.borrow_mut().push("confirmed".to_string());
            (self.outcome)()
        }
    }

    /// Writer that records the moment anything is written to it.
    struct LoggedWriter {
        buf: Vec<u8>,
        log: EventLog,
    }

    impl Write for LoggedWriter {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.log.borrow_mut().push("write".to_string());
            self.buf.extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "stdout closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn deployed() -> helpers::Result<ContractAddress> {
        Ok(ContractAddress::new(FIXED_ADDRESS))
    }

    fn rejected() -> helpers::Result<ContractAddress> {
        Err(DeployError::Discarded {
            tx_id: "0x01".to_string(),
            reason: "InputNoteAlreadyConsumed".to_string(),
        })
    }

    #[tokio::test]
    async fn successful_deployment_prints_address_and_exits_zero() {
        let mut deployer = FakeDeployer::new(deployed);
        let mut out = Vec::<u8>::new();
        let mut err = Vec::<u8>::new();

        let code = run(&mut deployer, "Miden testnet", &mut out, &mut err).await;

        assert_eq!(code, EXIT_SUCCESS);
        let out = String::from_utf8(out).unwrap();
        assert_eq!(
            out,
            format!("RealEstateX deployed to Miden testnet at address: {FIXED_ADDRESS}\n")
        );
        assert!(err.is_empty());
    }

    #[tokio::test]
    async fn failed_deployment_goes_to_stderr_and_exits_one() {
        let mut deployer = FakeDeployer::new(rejected);
        let mut out = Vec::<u8>::new();
        let mut err = Vec::<u8>::new();

        let code = run(&mut deployer, "Miden testnet", &mut out, &mut err).await;

        assert_eq!(code, EXIT_FAILURE);
        assert!(out.is_empty());
        let err = String::from_utf8(err).unwrap();
        assert!(err.starts_with("Error: transaction 0x01 was discarded"));
        assert!(err.contains("InputNoteAlreadyConsumed"));
    }

    #[tokio::test]
    async fn deploys_exactly_once_per_run() {
        for outcome in [deployed as fn() -> _, rejected] {
            let mut deployer = FakeDeployer::new(outcome);
            run(&mut deployer, "Miden testnet", &mut Vec::<u8>::new(), &mut Vec::<u8>::new()).await;
            assert_eq!(deployer.calls, vec![CONTRACT_NAME.to_string()]);
        }
    }

    #[tokio::test]
    async fn nothing_is_written_before_confirmation() {
        let mut deployer = FakeDeployer::new(deployed);
        let mut out = LoggedWriter {
            buf: Vec::<u8>::new(),
            log: deployer.log.clone(),
        };

        let code = run(&mut deployer, "Miden testnet", &mut out, &mut Vec::<u8>::new()).await;

        assert_eq!(code, EXIT_SUCCESS);
        let log = deployer.log.borrow();
        assert_eq!(log.first().map(String::as_str), Some("confirmed"));
        assert!(log[1..].iter().all(|event| event == "write"));
        assert!(String::from_utf8_lossy(&out.buf).contains(FIXED_ADDRESS));
    }

    #[tokio::test]
    async fn unwritable_stdout_is_a_failure() {
        let mut deployer = FakeDeployer::new(deployed);
        let mut err = Vec::<u8>::new();

        let code = run(&mut deployer, "Miden testnet", &mut BrokenPipe, &mut err).await;

        assert_eq!(code, EXIT_FAILURE);
        assert!(String::from_utf8(err).unwrap().contains("stdout closed"));
    }

    #[test]
    fn runs_without_arguments() {
        let args = DeployArgs::try_parse_from(["deploy_real_estate_x"]).unwrap();
        assert_eq!(args.network, Network::Testnet);
        assert!(args.rpc_url.is_none());
        assert_eq!(args.contracts_dir, PathBuf::from("../contracts"));
        assert_eq!(
            args.commit_policy(),
            CommitPolicy {
                poll_interval: Duration::from_secs(2),
                max_attempts: 60,
            }
        );

        let config = args.client_config().unwrap();
        assert_eq!(config.keystore_path, PathBuf::from("./keystore"));
        assert_eq!(config.store_path, PathBuf::from("./store.sqlite3"));
    }

    #[test]
    fn network_flag_selects_endpoint() {
        let args =
            DeployArgs::try_parse_from(["deploy_real_estate_x", "--network", "devnet"]).unwrap();
        assert_eq!(args.network, Network::Devnet);

        let bad = DeployArgs::try_parse_from(["deploy_real_estate_x", "--network", "mainnet"]);
        assert!(bad.is_err());
    }

    #[test]
    fn bad_network_value_exits_one_through_stderr() {
        let mut out = Vec::<u8>::new();
        let mut err = Vec::<u8>::new();

        let code = parse_args(
            ["deploy_real_estate_x", "--network", "mainnet"],
            &mut out,
            &mut err,
        )
        .unwrap_err();

        assert_eq!(code, EXIT_FAILURE);
        assert!(out.is_empty());
        let err = String::from_utf8(err).unwrap();
        assert!(err.starts_with("Error: invalid value 'mainnet'"));
        assert!(err.contains("unknown network `mainnet`"));
    }

    #[test]
    fn help_goes_to_stdout_and_exits_zero() {
        let mut out = Vec::<u8>::new();
        let mut err = Vec::<u8>::new();

        let code = parse_args(["deploy_real_estate_x", "--help"], &mut out, &mut err).unwrap_err();

        assert_eq!(code, EXIT_SUCCESS);
        assert!(err.is_empty());
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("--network"));
        assert!(out.contains("Path of the client's sqlite store"));
    }

    #[test]
    fn zero_confirmation_polls_are_rejected() {
        let code = parse_args(
            ["deploy_real_estate_x", "--max-polls", "0"],
            &mut Vec::<u8>::new(),
            &mut Vec::<u8>::new(),
        )
        .unwrap_err();
        assert_eq!(code, EXIT_FAILURE);

        let args = parse_args(
            ["deploy_real_estate_x", "--max-polls", "1"],
            &mut Vec::<u8>::new(),
            &mut Vec::<u8>::new(),
        )
        .unwrap();
        assert_eq!(args.commit_policy().max_attempts, 1);
    }

    #[test]
    fn failure_is_reported_once_at_default_log_level() {
        let logs = SharedBuf::default();
        let sink = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(default_log_filter(false)))
            .with_writer(move || sink.clone())
            .finish();
        let mut err = Vec::<u8>::new();

        let code = tracing::subscriber::with_default(subscriber, || {
            report_failure(&mut err, &"node unreachable")
        });

        assert_eq!(code, EXIT_FAILURE);
        assert_eq!(String::from_utf8(err).unwrap(), "Error: node unreachable\n");
        assert!(logs.0.lock().unwrap().is_empty());
    }

    #[test]
    fn contract_storage_has_registry_and_counter_maps() {
        let config = real_estate_x_account_config();
        assert_eq!(config.storage_slots.len(), 2);
        assert!(config
            .storage_slots
            .iter()
            .all(|slot| matches!(slot, StorageSlot::Map(_))));
    }
}
