//! Common helper functions for deployment scripts and tests

use std::{collections::BTreeSet, path::Path, sync::Arc};

use cargo_miden::{run, BuildOutput, CommandOutput, OutputType};
use miden_client::{
    account::{
        component::{AuthRpoFalcon512, BasicWallet, NoAuth},
        Account, AccountId, AccountStorageMode, AccountType, StorageSlot,
    },
    auth::AuthSecretKey,
    builder::ClientBuilder,
    crypto::{FeltRng, SecretKey},
    keystore::FilesystemKeyStore,
    note::{
        Note, NoteAssets, NoteExecutionHint, NoteInputs, NoteMetadata, NoteRecipient, NoteScript,
        NoteTag, NoteType,
    },
    rpc::TonicRpcClient,
    utils::Deserializable,
    Client, Felt,
};
use miden_mast_package::Package;
use miden_objects::account::{
    AccountBuilder, AccountComponent, AccountComponentMetadata, AccountComponentTemplate,
};
use rand::{rngs::StdRng, RngCore};
use tracing::{debug, info};

pub mod config;
pub mod deploy;
pub mod error;

pub use config::{ClientConfig, CommitPolicy, Network};
pub use deploy::{
    wait_for_commit, CommitStatus, CommitTracker, ContractAddress, ContractDeployer, MidenDeployer,
};
pub use error::{DeployError, Result};

pub type ScriptClient = Client<FilesystemKeyStore<StdRng>>;

/// Client and the keystore backing its authenticator
pub struct ClientSetup {
    pub client: ScriptClient,
    pub keystore: Arc<FilesystemKeyStore<StdRng>>,
}

/// Connect to the configured node with a sqlite store and filesystem keystore
pub async fn setup_client(config: &ClientConfig) -> Result<ClientSetup> {
    let rpc_api = Arc::new(TonicRpcClient::new(&config.endpoint, config.rpc_timeout_ms));

    let keystore = FilesystemKeyStore::<StdRng>::new(config.keystore_path.clone())
        .map_err(|e| DeployError::Keystore(e.to_string()))?;
    let keystore = Arc::new(keystore);

    let client = ClientBuilder::new()
        .rpc(rpc_api)
        .sqlite_store(config.store_path_str()?)
        .authenticator(keystore.clone())
        .in_debug_mode(config.debug_mode.into())
        .build()
        .await?;

    debug!(endpoint = ?config.endpoint, "client ready");
    Ok(ClientSetup { client, keystore })
}

/// Directory name of a contract crate: `RealEstateX` lives in `real-estate-x`.
pub fn contract_dir_name(contract_name: &str) -> String {
    let mut dir = String::with_capacity(contract_name.len() + 4);
    for (i, c) in contract_name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                dir.push('-');
            }
            dir.push(c.to_ascii_lowercase());
        } else {
            dir.push(c);
        }
    }
    dir
}

/// Compile the contract crate in `dir` with `cargo miden build` and load the resulting package.
pub fn build_project_in_dir(dir: &Path, release: bool) -> Result<Package> {
    let profile: &str = if release { "--release" } else { "--debug" };
    let manifest_path = dir.join("Cargo.toml");
    let build_error = |reason: String| DeployError::Build {
        dir: dir.to_path_buf(),
        reason,
    };

    let args = vec![
        "cargo".to_string(),
        "miden".to_string(),
        "build".to_string(),
        profile.to_string(),
        "--manifest-path".to_string(),
        manifest_path.to_string_lossy().to_string(),
    ];

    info!(manifest = %manifest_path.display(), profile, "building contract");
    let output = run(args.into_iter(), OutputType::Masm)
        .map_err(|e| build_error(e.to_string()))?
        .ok_or_else(|| build_error("cargo miden produced no output".to_string()))?;

    let artifact_path = match output {
        CommandOutput::BuildCommandOutput {
            output: BuildOutput::Masm { artifact_path },
        } => artifact_path,
        other => return Err(build_error(format!("expected a masm artifact, got {other:?}"))),
    };
    debug!(artifact = %artifact_path.display(), "contract built");

    let package_bytes = std::fs::read(&artifact_path)?;
    Package::read_from_bytes(&package_bytes).map_err(|e| DeployError::InvalidPackage(e.to_string()))
}

/// Configuration for creating an account with a custom component
#[derive(Clone)]
pub struct AccountCreationConfig {
    pub account_type: AccountType,
    pub storage_mode: AccountStorageMode,
    pub storage_slots: Vec<StorageSlot>,
    pub supported_types: Option<Vec<AccountType>>,
}

impl Default for AccountCreationConfig {
    fn default() -> Self {
        Self {
            account_type: AccountType::RegularAccountImmutableCode,
            storage_mode: AccountStorageMode::Public,
            storage_slots: vec![],
            supported_types: None,
        }
    }
}

pub fn account_component_from_package(
    package: Arc<Package>,
    config: &AccountCreationConfig,
) -> Result<AccountComponent> {
    let bytes = package
        .account_component_metadata_bytes
        .as_deref()
        .ok_or_else(|| {
            DeployError::InvalidPackage("no account component metadata present".to_string())
        })?;

    let metadata = AccountComponentMetadata::read_from_bytes(bytes)
        .map_err(|e| DeployError::InvalidPackage(e.to_string()))?;
    let template =
        AccountComponentTemplate::new(metadata, package.unwrap_library().as_ref().clone());

    let component = AccountComponent::new(template.library().clone(), config.storage_slots.clone())
        .map_err(|e| DeployError::Account(e.to_string()))?;

    // Fall back to the configured account type when no explicit set is given
    let supported_types = match &config.supported_types {
        Some(types) => BTreeSet::from_iter(types.clone()),
        None => BTreeSet::from_iter([config.account_type]),
    };

    Ok(component.with_supported_types(supported_types))
}

/// Build an account around a compiled component and register it with the client.
///
/// The account only exists locally until a transaction against it is committed.
pub async fn create_account_from_package(
    client: &mut ScriptClient,
    package: Arc<Package>,
    config: AccountCreationConfig,
) -> Result<Account> {
    let account_component = account_component_from_package(package, &config)?;

    let mut init_seed = [0_u8; 32];
    client.rng().fill_bytes(&mut init_seed);

    // Account ids are anchored to the latest known block
    client.sync_state().await?;

    let (account, seed) = AccountBuilder::new(init_seed)
        .account_type(config.account_type)
        .storage_mode(config.storage_mode)
        .with_component(account_component)
        .with_auth_component(NoAuth)
        .build()
        .map_err(|e| DeployError::Account(e.to_string()))?;

    debug!(account_id = %account.id().to_hex(), "account created");
    client.add_account(&account, Some(seed), false).await?;

    Ok(account)
}

/// Wallet account signed with a fresh Falcon key kept in `keystore`
pub async fn create_basic_wallet_account(
    client: &mut ScriptClient,
    keystore: Arc<FilesystemKeyStore<StdRng>>,
    config: AccountCreationConfig,
) -> Result<Account> {
    let mut init_seed = [0_u8; 32];
    client.rng().fill_bytes(&mut init_seed);

    let key_pair = SecretKey::with_rng(client.rng());

    client.sync_state().await?;

    let (account, seed) = AccountBuilder::new(init_seed)
        .account_type(config.account_type)
        .storage_mode(config.storage_mode)
        .with_auth_component(AuthRpoFalcon512::new(key_pair.public_key()))
        .with_component(BasicWallet)
        .build()
        .map_err(|e| DeployError::Account(e.to_string()))?;

    client.add_account(&account, Some(seed), false).await?;
    keystore
        .add_key(&AuthSecretKey::RpoFalcon512(key_pair))
        .map_err(|e| DeployError::Keystore(e.to_string()))?;

    debug!(account_id = %account.id().to_hex(), "wallet created");
    Ok(account)
}

/// Configuration for creating a note
pub struct NoteCreationConfig {
    pub note_type: NoteType,
    /// Local-use tag `(0, 0)` when unset
    pub tag: Option<NoteTag>,
    pub assets: NoteAssets,
    pub inputs: Vec<Felt>,
    pub execution_hint: NoteExecutionHint,
    pub aux: Felt,
}

impl Default for NoteCreationConfig {
    fn default() -> Self {
        Self {
            note_type: NoteType::Public,
            tag: None,
            assets: Default::default(),
            inputs: Default::default(),
            execution_hint: NoteExecutionHint::always(),
            aux: Felt::new(0),
        }
    }
}

/// Build a note carrying the note script compiled into `package`
pub fn create_note_from_package(
    client: &mut ScriptClient,
    package: Arc<Package>,
    sender_id: AccountId,
    config: NoteCreationConfig,
) -> Result<Note> {
    let note_program = package.unwrap_program();
    let note_script = NoteScript::from_parts(
        note_program.mast_forest().clone(),
        note_program.entrypoint(),
    );

    let tag = match config.tag {
        Some(tag) => tag,
        None => NoteTag::for_local_use_case(0, 0).map_err(|e| DeployError::Note(e.to_string()))?,
    };

    let serial_num = client.rng().draw_word();
    let note_inputs = NoteInputs::new(config.inputs).map_err(|e| DeployError::Note(e.to_string()))?;
    let recipient = NoteRecipient::new(serial_num, note_script, note_inputs);

    let metadata = NoteMetadata::new(
        sender_id,
        config.note_type,
        tag,
        config.execution_hint,
        config.aux,
    )
    .map_err(|e| DeployError::Note(e.to_string()))?;

    Ok(Note::new(config.assets, metadata, recipient))
}
