use anyhow::Context;
use async_trait::async_trait;

use super::MessagingProvider;
use crate::config::AppConfig;

const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";

pub struct TwilioSmsProvider {
    account_sid: String,
    auth_token: String,
    from_number: String,
    client: reqwest::Client,
}

impl TwilioSmsProvider {
    /// Returns `None` unless all Twilio credentials are configured.
    pub fn from_config(config: &AppConfig) -> Option<Self> {
        if !config.sms_enabled() {
            return None;
        }
        Some(Self {
            account_sid: config.twilio_account_sid.clone(),
            auth_token: config.twilio_auth_token.clone(),
            from_number: config.twilio_phone_number.clone(),
            client: reqwest::Client::new(),
        })
    }

    fn messages_url(&self) -> String {
        format!("{TWILIO_API_BASE}/Accounts/{}/Messages.json", self.account_sid)
    }
}

/// Normalizes a South African number to E.164. Local numbers ("082 555 0101")
/// get the +27 prefix; numbers already carrying a country code are kept.
/// Returns `None` when the input cannot be a phone number.
pub fn normalize_za_number(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let has_plus = trimmed.starts_with('+');
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.len() < 9 || digits.len() > 15 {
        return None;
    }

    if has_plus {
        Some(format!("+{digits}"))
    } else if let Some(local) = digits.strip_prefix('0') {
        (local.len() == 9).then(|| format!("+27{local}"))
    } else if digits.starts_with("27") && digits.len() == 11 {
        Some(format!("+{digits}"))
    } else {
        None
    }
}

#[async_trait]
impl MessagingProvider for TwilioSmsProvider {
    async fn send_message(&self, to: &str, body: &str) -> anyhow::Result<()> {
        let to = normalize_za_number(to)
            .with_context(|| format!("cannot send SMS to malformed number: {to}"))?;
        let url = self.messages_url();

        self.client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to.as_str()), ("From", self.from_number.as_str()), ("Body", body)])
            .send()
            .await
            .context("failed to send Twilio SMS")?
            .error_for_status()
            .context("Twilio API returned error")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_local_number() {
        assert_eq!(normalize_za_number("082 555 0101").as_deref(), Some("+27825550101"));
        assert_eq!(normalize_za_number("0825550101").as_deref(), Some("+27825550101"));
    }

    #[test]
    fn test_normalize_international_forms() {
        assert_eq!(normalize_za_number("+27 82 555 0101").as_deref(), Some("+27825550101"));
        assert_eq!(normalize_za_number("27825550101").as_deref(), Some("+27825550101"));
        assert_eq!(normalize_za_number("+44 20 7946 0958").as_deref(), Some("+442079460958"));
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert!(normalize_za_number("").is_none());
        assert!(normalize_za_number("12345").is_none());
        assert!(normalize_za_number("555 0101 9999").is_none());
    }

    #[test]
    fn test_from_config_requires_credentials() {
        let mut config = AppConfig {
            port: 3000,
            database_url: ":memory:".to_string(),
            session_secret: "secret".to_string(),
            cors_allow_origin: None,
            twilio_account_sid: "AC123".to_string(),
            twilio_auth_token: String::new(),
            twilio_phone_number: "+27215550100".to_string(),
        };
        assert!(TwilioSmsProvider::from_config(&config).is_none());

        config.twilio_auth_token = "token".to_string();
        let provider = TwilioSmsProvider::from_config(&config).unwrap();
        assert_eq!(
            provider.messages_url(),
            "https://api.twilio.com/2010-04-01/Accounts/AC123/Messages.json"
        );
    }
}
