//! `breakglass aws`: dynamic IAM users, optionally with a console login.
//!
//! With `--create-login-profile` the session is held open: the access key is
//! polled until IAM accepts it, a console password is set for the IAM user,
//! and on Ctrl-C the login profile is removed before the lease is revoked.

use anyhow::{Context, Result};
use clap::Args;
use std::sync::Arc;
use tracing::{info, Instrument};

use super::output::{print_credential, CredentialView};
use super::{finish, validate_broker_path, CommandContext};
use crate::activation::{await_ready, ActivationState, RetryPolicy};
use crate::broker::SecretString;
use crate::credentials::{Credential, CredentialKind};
use crate::errors::Error;
use crate::guard::{ListenerHandle, SessionGuard};
use crate::issuer::IssueRequest;
use crate::lease_span;
use crate::targets::aws::{
    generate_console_password, is_not_yet_propagated, IamClient, LoginProfile,
};

#[derive(Args, Debug)]
pub struct AwsArgs {
    /// Full Vault path of the AWS role (e.g. aws/creds/oncall)
    #[arg(short = 'R', long)]
    pub role: String,

    /// Also set a console password for the IAM user; removed on exit
    #[arg(short = 'L', long)]
    pub create_login_profile: bool,

    /// IAM API endpoint (defaults to the public AWS endpoint)
    #[arg(long, hide = true)]
    pub iam_endpoint: Option<String>,
}

/// Console login details handed to the operator.
#[derive(Debug, Clone)]
pub struct ConsoleLogin {
    pub user_name: String,
    pub password: SecretString,
}

pub async fn run(args: AwsArgs, ctx: &CommandContext) -> Result<()> {
    validate_broker_path(&args.role, "AWS role")?;

    let lease = ctx
        .issuer()
        .issue(IssueRequest::new(&args.role, CredentialKind::CloudIdentity))
        .await
        .with_context(|| format!("Could not get AWS credentials for {}", args.role))?;

    let span = lease_span!(lease.lease_id(), lease.credential().kind(), path = %args.role);
    async move {
        if !args.create_login_profile {
            return print_credential(&CredentialView::from_lease(&lease), ctx.output);
        }

        let (guard, listener) = ctx.guard(lease);
        let output = ctx.output;
        let outcome = async {
            let Credential::CloudIdentity(identity) = guard.lease().credential() else {
                return Err(Error::config("Expected an AWS access key"));
            };
            let iam = Arc::new(IamClient::connect(identity, args.iam_endpoint.as_deref()).await);
            let activation = ctx.settings.activation_policy();

            run_console_session(&guard, &listener, iam, &activation, |login| {
                let view = CredentialView::from_lease(guard.lease())
                    .with_field("console_user", login.user_name.as_str())
                    .with_field("console_password", login.password.expose_secret());
                if let Err(err) = print_credential(&view, output) {
                    tracing::error!(error = %err, "Failed to print credentials");
                }
                eprintln!("Press Ctrl-C when finished to remove the login and revoke the credentials");
            })
            .await
        }
        .await;

        listener.complete();
        finish(outcome, listener.join().await)
    }
    .instrument(span)
    .await
}

/// Drive a guarded console session until the listener starts cleanup.
///
/// Waits for IAM to accept the leased key, creates a login profile under a
/// cleanup hold so it is always tracked by `guard`, reports it through
/// `on_ready`, then waits for an interrupt. An interrupt before the profile
/// exists returns `Ok` and leaves only the lease to revoke.
pub async fn run_console_session<F>(
    guard: &SessionGuard,
    listener: &ListenerHandle,
    iam: Arc<IamClient>,
    activation: &RetryPolicy,
    on_ready: F,
) -> crate::errors::Result<()>
where
    F: FnOnce(&ConsoleLogin),
{
    info!("Waiting for the access key to propagate");
    let state = tokio::select! {
        state = await_ready(|| iam.list_users(), is_not_yet_propagated, activation) => state,
        _ = listener.interrupted() => return Ok(()),
    };
    if let ActivationState::Failed(reason) = state {
        return Err(Error::Activation(reason));
    }

    if !guard.go_live() {
        return Ok(());
    }

    let login = {
        let Some(_hold) = guard.hold().await else {
            return Ok(());
        };
        let user_name = iam.access_key_user().await?;
        let password = generate_console_password();
        let profile = LoginProfile::create(Arc::clone(&iam), user_name.clone(), &password).await?;
        if let Err(refused) = guard.attach_secondary(Box::new(profile)) {
            let reason = refused.to_string();
            let resource = refused.into_resource();
            if let Err(err) = resource.teardown().await {
                tracing::error!(resource = %resource.describe(), error = %err, "Failed to remove untracked resource");
            }
            return Err(Error::config(reason));
        }
        ConsoleLogin { user_name, password }
    };

    on_ready(&login);
    listener.interrupted().await;
    Ok(())
}
