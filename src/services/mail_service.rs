//! 邮件服务
//! 投递通过 Mailer 端口完成，默认实现只写日志

use crate::{config::MailConfig, error::AppError, models::contact::ContactMessage};
use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub from: String,
    pub to: String,
    pub reply_to: Option<String>,
    pub subject: String,
    pub body: String,
}

/// 邮件投递端口
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: MailMessage) -> Result<(), AppError>;
}

/// 将邮件写入日志的投递实现
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: MailMessage) -> Result<(), AppError> {
        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            "Mail dispatched (log mailer)"
        );
        tracing::debug!(body = %message.body, "Mail body");
        Ok(())
    }
}

pub struct MailService {
    mailer: std::sync::Arc<dyn Mailer>,
    config: MailConfig,
}

impl MailService {
    pub fn new(mailer: std::sync::Arc<dyn Mailer>, config: MailConfig) -> Self {
        Self { mailer, config }
    }

    fn message(&self, to: &str, subject: &str, body: String) -> MailMessage {
        MailMessage {
            from: self.config.from_address.clone(),
            to: to.to_string(),
            reply_to: None,
            subject: subject.to_string(),
            body,
        }
    }

    /// 注册后的邮箱验证邮件
    pub async fn send_verification(&self, to: &str, name: &str, token: &str) -> Result<(), AppError> {
        let link = format!("{}/verify-email?token={}", self.config.public_base_url, token);
        let body = format!(
            "Hello {},\n\nPlease confirm your email address by opening the link below:\n{}\n",
            name, link
        );
        self.mailer
            .send(self.message(to, "Verify your email address", body))
            .await
    }

    /// 密码重置邮件
    pub async fn send_password_reset(
        &self,
        to: &str,
        name: &str,
        token: &str,
        valid_minutes: u64,
    ) -> Result<(), AppError> {
        let link = format!("{}/reset-password?token={}", self.config.public_base_url, token);
        let body = format!(
            "Hello {},\n\nA password reset was requested for your account. The link below is valid for {} minutes:\n{}\n\nIf you did not request this, ignore this email.\n",
            name, valid_minutes, link
        );
        self.mailer
            .send(self.message(to, "Password reset request", body))
            .await
    }

    /// 联系表单通知工作人员
    pub async fn send_contact_notification(&self, form: &ContactMessage) -> Result<(), AppError> {
        let body = format!(
            "New contact form submission\n\nName: {}\nEmail: {}\nPhone: {}\nSubject: {}\n\n{}\n",
            form.name,
            form.email,
            form.phone.as_deref().unwrap_or("-"),
            form.subject,
            form.message
        );
        let mut message = self.message(
            &self.config.staff_address,
            &format!("Contact form: {}", form.subject),
            body,
        );
        message.reply_to = Some(form.email.clone());
        self.mailer.send(message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::contact::ContactRequest;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Capture(Mutex<Vec<MailMessage>>);

    #[async_trait]
    impl Mailer for Capture {
        async fn send(&self, message: MailMessage) -> Result<(), AppError> {
            self.0.lock().unwrap().push(message);
            Ok(())
        }
    }

    fn config() -> MailConfig {
        MailConfig {
            from_address: "no-reply@union.org".into(),
            staff_address: "staff@union.org".into(),
            public_base_url: "https://union.org".into(),
        }
    }

    #[tokio::test]
    async fn test_contact_goes_to_staff_with_reply_to() {
        let capture = Arc::new(Capture::default());
        let service = MailService::new(capture.clone(), config());
        let form = ContactMessage::new(
            ContactRequest {
                name: "Asha".into(),
                email: "asha@example.org".into(),
                phone: None,
                subject: "Membership".into(),
                message: "How do I join the union?".into(),
            },
            "10.0.0.1",
        );

        service.send_contact_notification(&form).await.unwrap();

        let sent = capture.0.lock().unwrap();
        assert_eq!(sent[0].to, "staff@union.org");
        assert_eq!(sent[0].reply_to.as_deref(), Some("asha@example.org"));
        assert!(sent[0].body.contains("How do I join"));
    }

    #[tokio::test]
    async fn test_reset_mail_carries_link() {
        let capture = Arc::new(Capture::default());
        let service = MailService::new(capture.clone(), config());

        service.send_password_reset("a@union.org", "A", "abc123", 10).await.unwrap();

        let sent = capture.0.lock().unwrap();
        assert!(sent[0].body.contains("https://union.org/reset-password?token=abc123"));
    }
}
