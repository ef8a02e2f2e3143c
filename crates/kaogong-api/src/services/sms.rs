use async_trait::async_trait;
use kaogong_persist::CodePurpose;

/// Delivers verification codes to a phone number
#[async_trait]
pub trait CodeSender: Send + Sync {
    async fn send_code(&self, phone: &str, purpose: CodePurpose, code: &str) -> anyhow::Result<()>;
}

/// Writes codes to the log instead of sending an SMS. For development
/// and for deployments where the SMS provider is not configured.
pub struct LogCodeSender;

#[async_trait]
impl CodeSender for LogCodeSender {
    async fn send_code(&self, phone: &str, purpose: CodePurpose, code: &str) -> anyhow::Result<()> {
        tracing::info!(phone = %mask_phone(phone), ?purpose, code = %code, "Verification code issued");
        Ok(())
    }
}

/// `13812345678` → `138****5678`
pub fn mask_phone(phone: &str) -> String {
    if phone.len() != 11 || !phone.is_ascii() {
        return "***".to_string();
    }
    format!("{}****{}", &phone[..3], &phone[7..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_phone() {
        assert_eq!(mask_phone("13812345678"), "138****5678");
        assert_eq!(mask_phone("123"), "***");
    }
}
