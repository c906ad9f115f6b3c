//! Contract deployment against a Miden node
//!
//! Deploying a contract means compiling its crate into a package, building an account around
//! the package's component and committing a first transaction against that account. Only once
//! that transaction is committed does the account id become a usable on-chain address.

use std::{fmt, path::PathBuf, sync::Arc};

use async_trait::async_trait;
use miden_client::{
    account::AccountId,
    store::TransactionFilter,
    transaction::{TransactionId, TransactionRequestBuilder, TransactionStatus},
};
use tracing::{debug, info, instrument, warn};

use crate::{
    build_project_in_dir, contract_dir_name, create_account_from_package, AccountCreationConfig,
    CommitPolicy, DeployError, Result, ScriptClient,
};

/// On-chain address of a deployed contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractAddress(String);

impl ContractAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<AccountId> for ContractAddress {
    fn from(id: AccountId) -> Self {
        Self(id.to_hex())
    }
}

impl fmt::Display for ContractAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Something that can turn a contract name into a deployed, confirmed contract.
///
/// `deploy` resolves only after the network has confirmed the deployment.
#[async_trait(?Send)]
pub trait ContractDeployer {
    async fn deploy(&mut self, contract_name: &str) -> Result<ContractAddress>;
}

/// Deploys contracts from `contracts_dir` through a live Miden client
pub struct MidenDeployer {
    client: ScriptClient,
    contracts_dir: PathBuf,
    account_config: AccountCreationConfig,
    commit_policy: CommitPolicy,
    release: bool,
}

impl MidenDeployer {
    pub fn new(client: ScriptClient, contracts_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            contracts_dir: contracts_dir.into(),
            account_config: AccountCreationConfig::default(),
            commit_policy: CommitPolicy::default(),
            release: true,
        }
    }

    pub fn with_account_config(mut self, account_config: AccountCreationConfig) -> Self {
        self.account_config = account_config;
        self
    }

    pub fn with_commit_policy(mut self, commit_policy: CommitPolicy) -> Self {
        self.commit_policy = commit_policy;
        self
    }

    pub fn with_release(mut self, release: bool) -> Self {
        self.release = release;
        self
    }

    pub fn client_mut(&mut self) -> &mut ScriptClient {
        &mut self.client
    }
}

#[async_trait(?Send)]
impl ContractDeployer for MidenDeployer {
    #[instrument(skip(self), fields(dir = tracing::field::Empty))]
    async fn deploy(&mut self, contract_name: &str) -> Result<ContractAddress> {
        let dir = self.contracts_dir.join(contract_dir_name(contract_name));
        tracing::Span::current().record("dir", tracing::field::display(dir.display()));

        let package = Arc::new(build_project_in_dir(&dir, self.release)?);

        let account =
            create_account_from_package(&mut self.client, package, self.account_config.clone())
                .await?;
        let account_id = account.id();

        // An empty transaction is enough to publish a new account
        let request = TransactionRequestBuilder::new()
            .build()
            .map_err(|e| DeployError::TransactionRequest(e.to_string()))?;
        let tx_result = self.client.new_transaction(account_id, request).await?;
        let tx_id = tx_result.executed_transaction().id();

        self.client.submit_transaction(tx_result).await?;
        info!(tx_id = %tx_id.to_hex(), account_id = %account_id.to_hex(), "deployment submitted");

        wait_for_commit(&mut self.client, tx_id, self.commit_policy).await?;

        Ok(ContractAddress::from(account_id))
    }
}

/// Where a submitted transaction stands, as far as the client knows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitStatus {
    Pending,
    Committed,
    Discarded(String),
}

/// Chain view needed to follow a transaction until it is committed.
#[async_trait(?Send)]
pub trait CommitTracker {
    type TxId: Copy;

    /// Catch up with the chain, returning the latest block number.
    async fn sync_chain(&mut self) -> Result<u32>;

    /// `None` when the transaction is not tracked at all.
    async fn commit_status(&mut self, tx_id: Self::TxId) -> Result<Option<CommitStatus>>;

    fn describe(&self, tx_id: Self::TxId) -> String;
}

#[async_trait(?Send)]
impl CommitTracker for ScriptClient {
    type TxId = TransactionId;

    async fn sync_chain(&mut self) -> Result<u32> {
        let summary = self.sync_state().await?;
        Ok(summary.block_num.as_u32())
    }

    async fn commit_status(&mut self, tx_id: TransactionId) -> Result<Option<CommitStatus>> {
        let record = self
            .get_transactions(TransactionFilter::Ids(vec![tx_id]))
            .await?
            .pop();

        Ok(record.map(|record| match &record.status {
            TransactionStatus::Committed { .. } => CommitStatus::Committed,
            TransactionStatus::Pending => CommitStatus::Pending,
            status @ TransactionStatus::Discarded { .. } => {
                CommitStatus::Discarded(format!("{status:?}"))
            }
        }))
    }

    fn describe(&self, tx_id: TransactionId) -> String {
        tx_id.to_hex()
    }
}

/// Sync with the node until `tx_id` is committed.
///
/// Fails if the node discards the transaction or it is still pending after
/// `policy.max_attempts` polls.
pub async fn wait_for_commit<T>(tracker: &mut T, tx_id: T::TxId, policy: CommitPolicy) -> Result<()>
where
    T: CommitTracker + ?Sized,
{
    for attempt in 1..=policy.max_attempts {
        let block_num = tracker.sync_chain().await?;

        let status = tracker
            .commit_status(tx_id)
            .await?
            .ok_or_else(|| DeployError::UntrackedTransaction(tracker.describe(tx_id)))?;

        match status {
            CommitStatus::Committed => {
                info!(tx_id = %tracker.describe(tx_id), attempt, "transaction committed");
                return Ok(());
            }
            CommitStatus::Pending => {
                debug!(attempt, block_num, "transaction pending");
                tokio::time::sleep(policy.poll_interval).await;
            }
            CommitStatus::Discarded(reason) => {
                warn!(tx_id = %tracker.describe(tx_id), %reason, "transaction discarded");
                return Err(DeployError::Discarded {
                    tx_id: tracker.describe(tx_id),
                    reason,
                });
            }
        }
    }

    Err(DeployError::CommitTimeout {
        tx_id: tracker.describe(tx_id),
        attempts: policy.max_attempts,
    })
}
