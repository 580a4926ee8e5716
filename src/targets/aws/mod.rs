//! # AWS IAM target
//!
//! An IAM client built on the AWS SDK with the leased access key, enough to
//! confirm the key has propagated, find the user it belongs to, and manage a
//! console login profile for that user.
//!
//! IAM reports a freshly created key as `InvalidClientTokenId` until it has
//! propagated, and refuses profile changes with `EntityTemporarilyUnmodifiable`
//! while the user is still settling. Both are transient.

mod password;

pub use password::generate_console_password;

use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_iam::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_iam::Client;
use aws_types::region::Region;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::TargetError;
use crate::broker::SecretString;
use crate::credentials::CloudIdentity;
use crate::guard::SecondaryResource;

/// IAM is a global service served from us-east-1.
const REGION: &str = "us-east-1";
const CREDENTIALS_SOURCE: &str = "breakglass";

pub const NOT_YET_PROPAGATED: &str = "InvalidClientTokenId";
pub const TEMPORARILY_UNMODIFIABLE: &str = "EntityTemporarilyUnmodifiable";

/// Activation classifier: the key is not yet known to IAM.
pub fn is_not_yet_propagated(err: &TargetError) -> bool {
    err.code == NOT_YET_PROPAGATED
}

/// Teardown classifier: the user cannot be modified yet.
pub fn is_temporarily_unmodifiable(err: &TargetError) -> bool {
    err.code == TEMPORARILY_UNMODIFIABLE
}

/// IAM client authenticated with a leased access key.
#[derive(Debug)]
pub struct IamClient {
    client: Client,
    access_key: String,
}

impl IamClient {
    /// Build a client for `identity`. `endpoint` overrides the public IAM
    /// endpoint. The SDK's own retries are disabled so activation and teardown
    /// policies decide every retry.
    pub async fn connect(identity: &CloudIdentity, endpoint: Option<&str>) -> Self {
        let credentials = Credentials::new(
            identity.access_key.clone(),
            identity.secret_key.expose_secret().to_string(),
            identity
                .security_token
                .as_ref()
                .map(|token| token.expose_secret().to_string())
                .filter(|token| !token.is_empty()),
            None,
            CREDENTIALS_SOURCE,
        );

        let shared_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(REGION))
            .credentials_provider(credentials)
            .retry_config(RetryConfig::disabled())
            .timeout_config(
                TimeoutConfig::builder().operation_timeout(Duration::from_secs(30)).build(),
            )
            .load()
            .await;

        let mut builder = aws_sdk_iam::config::Builder::from(&shared_config);
        if let Some(endpoint) = endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        Self { client: Client::from_conf(builder.build()), access_key: identity.access_key.clone() }
    }

    /// Activation probe: any authenticated call that only succeeds once the key is live.
    pub async fn list_users(&self) -> Result<(), TargetError> {
        self.client.list_users().max_items(1).send().await.map_err(target_error)?;
        debug!("IAM accepted the access key");
        Ok(())
    }

    /// Name of the IAM user that owns the signing key.
    pub async fn access_key_user(&self) -> Result<String, TargetError> {
        let output = self
            .client
            .get_access_key_last_used()
            .access_key_id(&self.access_key)
            .send()
            .await
            .map_err(target_error)?;

        output.user_name().map(str::to_string).ok_or_else(|| {
            TargetError::new("MalformedResponse", "No UserName in GetAccessKeyLastUsed response")
        })
    }

    pub async fn create_login_profile(
        &self,
        user_name: &str,
        password: &SecretString,
    ) -> Result<(), TargetError> {
        self.client
            .create_login_profile()
            .user_name(user_name)
            .password(password.expose_secret())
            .password_reset_required(false)
            .send()
            .await
            .map_err(target_error)?;
        info!(user = %user_name, "Created IAM login profile");
        Ok(())
    }

    pub async fn delete_login_profile(&self, user_name: &str) -> Result<(), TargetError> {
        self.client
            .delete_login_profile()
            .user_name(user_name)
            .send()
            .await
            .map_err(target_error)?;
        Ok(())
    }
}

/// Service errors keep IAM's own code; anything that never reached IAM is a transport error.
fn target_error<E, R>(err: SdkError<E, R>) -> TargetError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    if let SdkError::ServiceError(context) = &err {
        let service = context.err();
        if let Some(code) = service.code() {
            return TargetError::new(code, service.message().unwrap_or_default());
        }
    }
    TargetError::transport(DisplayErrorContext(&err).to_string())
}

/// A console login profile created for the leased IAM user.
pub struct LoginProfile {
    client: Arc<IamClient>,
    user_name: String,
}

impl LoginProfile {
    pub async fn create(
        client: Arc<IamClient>,
        user_name: String,
        password: &SecretString,
    ) -> Result<Self, TargetError> {
        client.create_login_profile(&user_name, password).await?;
        Ok(Self { client, user_name })
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }
}

#[async_trait]
impl SecondaryResource for LoginProfile {
    fn describe(&self) -> String {
        format!("IAM login profile for user '{}'", self.user_name)
    }

    async fn teardown(&self) -> Result<(), TargetError> {
        self.client.delete_login_profile(&self.user_name).await
    }

    fn is_transient(&self, err: &TargetError) -> bool {
        is_temporarily_unmodifiable(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn identity(token: Option<&str>) -> CloudIdentity {
        CloudIdentity {
            access_key: "AKIATESTKEY".to_string(),
            secret_key: "secret".into(),
            security_token: token.map(SecretString::from),
        }
    }

    fn error_xml(code: &str, message: &str) -> String {
        format!(
            "<ErrorResponse xmlns=\"https://iam.amazonaws.com/doc/2010-05-08/\">\
             <Error><Type>Sender</Type><Code>{}</Code><Message>{}</Message></Error>\
             <RequestId>4a0a1d0b</RequestId></ErrorResponse>",
            code, message
        )
    }

    fn xml_ok(action: &str, result: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_string(format!(
            "<{action}Response xmlns=\"https://iam.amazonaws.com/doc/2010-05-08/\">{result}\
             <ResponseMetadata><RequestId>7a62c49f</RequestId></ResponseMetadata>\
             </{action}Response>"
        ))
    }

    fn list_users_ok() -> ResponseTemplate {
        xml_ok(
            "ListUsers",
            "<ListUsersResult><Users/><IsTruncated>false</IsTruncated></ListUsersResult>",
        )
    }

    async fn client(server: &MockServer, token: Option<&str>) -> IamClient {
        IamClient::connect(&identity(token), Some(&server.uri())).await
    }

    #[tokio::test]
    async fn test_list_users_sends_signed_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(header_exists("authorization"))
            .and(header_exists("x-amz-date"))
            .and(body_string_contains("Action=ListUsers"))
            .and(body_string_contains("Version=2010-05-08"))
            .and(body_string_contains("MaxItems=1"))
            .respond_with(list_users_ok())
            .expect(1)
            .mount(&server)
            .await;

        client(&server, None).await.list_users().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_client_token_is_not_yet_propagated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(403)
                    .set_body_string(error_xml("InvalidClientTokenId", "The security token included in the request is invalid.")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server, None).await.list_users().await.unwrap_err();

        assert_eq!(err.code, NOT_YET_PROPAGATED);
        assert!(err.message.contains("security token"));
        assert!(is_not_yet_propagated(&err));
        assert!(!is_temporarily_unmodifiable(&err));
    }

    #[tokio::test]
    async fn test_access_key_user_parses_user_name() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("Action=GetAccessKeyLastUsed"))
            .and(body_string_contains("AccessKeyId=AKIATESTKEY"))
            .respond_with(xml_ok(
                "GetAccessKeyLastUsed",
                "<GetAccessKeyLastUsedResult>\
                 <UserName>vault-oncall-1700000000-1234</UserName>\
                 <AccessKeyLastUsed><Region>N/A</Region><ServiceName>N/A</ServiceName></AccessKeyLastUsed>\
                 </GetAccessKeyLastUsedResult>",
            ))
            .mount(&server)
            .await;

        let user = client(&server, None).await.access_key_user().await.unwrap();
        assert_eq!(user, "vault-oncall-1700000000-1234");
    }

    #[tokio::test]
    async fn test_security_token_header_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header_exists("x-amz-security-token"))
            .respond_with(list_users_ok())
            .expect(1)
            .mount(&server)
            .await;

        client(&server, Some("FwoG")).await.list_users().await.unwrap();
    }

    #[tokio::test]
    async fn test_login_profile_lifecycle() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("Action=CreateLoginProfile"))
            .and(body_string_contains("PasswordResetRequired=false"))
            .respond_with(xml_ok(
                "CreateLoginProfile",
                "<CreateLoginProfileResult><LoginProfile>\
                 <UserName>oncall</UserName>\
                 <CreateDate>2024-01-01T00:00:00Z</CreateDate>\
                 <PasswordResetRequired>false</PasswordResetRequired>\
                 </LoginProfile></CreateLoginProfileResult>",
            ))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("Action=DeleteLoginProfile"))
            .respond_with(
                ResponseTemplate::new(409)
                    .set_body_string(error_xml("EntityTemporarilyUnmodifiable", "try again")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let iam = Arc::new(client(&server, None).await);
        let profile = LoginProfile::create(iam, "oncall".to_string(), &"P@ss".into()).await.unwrap();

        assert_eq!(profile.user_name(), "oncall");
        assert!(profile.describe().contains("'oncall'"));
        let err = profile.teardown().await.unwrap_err();
        assert!(profile.is_transient(&err));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let server = MockServer::start().await;
        let uri = server.uri();
        drop(server);

        let iam = IamClient::connect(&identity(None), Some(&uri)).await;
        let err = iam.list_users().await.unwrap_err();

        assert_eq!(err.code, "Transport");
        assert!(!is_not_yet_propagated(&err));
    }
}
