use std::time::Duration;

use aws_config::meta::region::RegionProviderChain;
use aws_config::retry::RetryConfig as SdkRetryConfig;
use aws_config::stalled_stream_protection::StalledStreamProtectionConfig;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, ConfigLoader, SdkConfig};
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Credentials, Region};

use crate::config::{CLITimeoutConfig, ClientConfig};
use crate::types::S3Credentials;

const CREDENTIALS_PROVIDER_NAME: &str = "s3mirror";

impl ClientConfig {
    /// Build an S3 client from this configuration.
    ///
    /// No request is sent; bucket reachability is checked by the session
    /// factory.
    pub async fn create_client(&self) -> Client {
        let sdk_config = self.load_sdk_config().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(self.force_path_style)
            .request_checksum_calculation(self.request_checksum_calculation)
            .build();

        Client::from_conf(s3_config)
    }

    async fn load_sdk_config(&self) -> SdkConfig {
        let mut config_loader = aws_config::defaults(BehaviorVersion::latest());

        config_loader = match &self.credential {
            S3Credentials::Profile(profile_name) => config_loader.profile_name(profile_name),
            S3Credentials::Credentials { access_keys } => {
                config_loader.credentials_provider(Credentials::new(
                    access_keys.access_key.clone(),
                    access_keys.secret_access_key.clone(),
                    access_keys.session_token.clone(),
                    None,
                    CREDENTIALS_PROVIDER_NAME,
                ))
            }
            S3Credentials::FromEnvironment => config_loader,
        };

        config_loader = config_loader.region(self.build_region_provider());

        if let Some(endpoint_url) = &self.endpoint_url {
            config_loader = config_loader.endpoint_url(endpoint_url);
        }

        config_loader = self.apply_retry_and_timeout(config_loader);

        if self.disable_stalled_stream_protection {
            config_loader =
                config_loader.stalled_stream_protection(StalledStreamProtectionConfig::disabled());
        }

        config_loader.load().await
    }

    // An explicit region wins; otherwise the default chain (which honours the
    // selected profile) decides.
    fn build_region_provider(&self) -> RegionProviderChain {
        RegionProviderChain::first_try(self.region.clone().map(Region::new)).or_default_provider()
    }

    fn apply_retry_and_timeout(&self, config_loader: ConfigLoader) -> ConfigLoader {
        let retry_config = SdkRetryConfig::standard()
            .with_max_attempts(self.retry_config.aws_max_attempts)
            .with_initial_backoff(Duration::from_millis(
                self.retry_config.initial_backoff_milliseconds,
            ));

        let config_loader = config_loader.retry_config(retry_config);
        match build_timeout_config(&self.cli_timeout_config) {
            Some(timeout_config) => config_loader.timeout_config(timeout_config),
            None => config_loader,
        }
    }
}

// Only the timeouts given on the command line are set. Passing `None` to a
// setter would disable that timeout instead of keeping the SDK default.
fn build_timeout_config(timeout: &CLITimeoutConfig) -> Option<TimeoutConfig> {
    let mut builder = TimeoutConfig::builder();
    let mut any_set = false;

    if let Some(ms) = timeout.operation_timeout_milliseconds {
        builder.set_operation_timeout(Some(Duration::from_millis(ms)));
        any_set = true;
    }
    if let Some(ms) = timeout.operation_attempt_timeout_milliseconds {
        builder.set_operation_attempt_timeout(Some(Duration::from_millis(ms)));
        any_set = true;
    }
    if let Some(ms) = timeout.connect_timeout_milliseconds {
        builder.set_connect_timeout(Some(Duration::from_millis(ms)));
        any_set = true;
    }
    if let Some(ms) = timeout.read_timeout_milliseconds {
        builder.set_read_timeout(Some(Duration::from_millis(ms)));
        any_set = true;
    }

    any_set.then(|| builder.build())
}
