//! Accounts stage: source users become target hub accounts.

use async_trait::async_trait;

use super::engine::{EntitySync, MissingDependency, StageRun};
use super::fetch::{Paginator, UserPages};
use super::progress::EventCallback;
use super::types::{StageReport, SyncOptions};
use crate::kind::EntityKind;
use crate::ledger::{LedgerError, MappingLedger};
use crate::platform::{NewAccount, RemoteError, SourceApi, SourceUser, TargetApi};

/// Creates or locates one target account per source user, keyed by login.
pub struct AccountSync<'a, T: ?Sized> {
    target: &'a T,
}

impl<'a, T: TargetApi + ?Sized> AccountSync<'a, T> {
    pub fn new(target: &'a T) -> Self {
        Self { target }
    }
}

#[async_trait]
impl<T: TargetApi + ?Sized> EntitySync for AccountSync<'_, T> {
    type Record = SourceUser;
    type Payload = NewAccount;

    fn kind(&self) -> EntityKind {
        EntityKind::Accounts
    }

    fn source_id(&self, user: &SourceUser) -> Option<String> {
        user.source_id()
    }

    async fn prepare(
        &self,
        user: &SourceUser,
        _notes: &mut Vec<String>,
    ) -> Result<NewAccount, MissingDependency> {
        account_payload(user)
    }

    async fn create(&self, account: &NewAccount) -> Result<String, RemoteError> {
        self.target.create_account(account).await
    }

    async fn locate(&self, account: &NewAccount) -> Result<Option<String>, RemoteError> {
        self.target.find_account(&account.login).await
    }
}

/// Build the target account for a source user.
///
/// The login is the natural key; users without one fall back to their id.
pub fn account_payload(user: &SourceUser) -> Result<NewAccount, MissingDependency> {
    let login = user
        .login
        .clone()
        .or_else(|| user.source_id())
        .ok_or_else(|| MissingDependency("user has neither login nor id".into()))?;
    Ok(NewAccount {
        name: user.display.clone().unwrap_or_else(|| login.clone()),
        email: user.email.clone().filter(|e| !e.trim().is_empty()),
        login,
    })
}

/// Run the accounts stage against `ledger`.
pub async fn sync_accounts<S, T>(
    source: &S,
    target: &T,
    ledger: &mut MappingLedger,
    options: &SyncOptions,
    on_event: Option<&EventCallback>,
) -> Result<StageReport, LedgerError>
where
    S: SourceApi + ?Sized,
    T: TargetApi + ?Sized,
{
    let sync = AccountSync::new(target);
    let mut run = StageRun::new(ledger, options, on_event);
    let pager = Paginator::new(UserPages::new(source), options.page_size);
    run.sync_scope(&sync, pager).await?;
    run.finish()
}
