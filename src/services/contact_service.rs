//! 联系表单留言服务
//! 留言先落库再通知工作人员，邮件失败不会丢失留言

use crate::{
    auth::{middleware::AuthContext, privileged::Outcome},
    error::AppError,
    models::{
        contact::{ContactListQuery, ContactMessage, ContactRequest},
        pagination, Page,
    },
    repository::ContactStore,
    services::MailService,
};
use std::sync::Arc;
use uuid::Uuid;

pub struct ContactService {
    store: Arc<dyn ContactStore>,
    mail: Arc<MailService>,
}

impl ContactService {
    pub fn new(store: Arc<dyn ContactStore>, mail: Arc<MailService>) -> Self {
        Self { store, mail }
    }

    /// 保存留言并发送通知邮件
    pub async fn submit(&self, form: ContactRequest, ip_address: &str) -> Result<ContactMessage, AppError> {
        let message = ContactMessage::new(form, ip_address);
        self.store.insert(&message).await?;
        metrics::counter!("contact_messages_total").increment(1);

        if let Err(e) = self.mail.send_contact_notification(&message).await {
            tracing::error!(contact_id = %message.id, error = %e, "Failed to deliver contact form");
            return Err(AppError::internal_error("Failed to send message"));
        }

        tracing::info!(contact_id = %message.id, subject = %message.subject, "Contact form submitted");
        Ok(message)
    }

    pub async fn list(&self, query: ContactListQuery) -> Result<Outcome<Page<ContactMessage>>, AppError> {
        let unread_only = query.unread.unwrap_or(false);
        let (page, limit, offset) = pagination(query.page, query.limit);

        let total = self.store.count(unread_only).await?;
        let items = self.store.list(unread_only, limit as i64, offset).await?;
        Ok(Outcome::new(Page::new(items, total, page, limit)))
    }

    /// 读取单条留言，首次读取时标记为已读
    pub async fn read(&self, ctx: &AuthContext, id: Uuid) -> Result<Outcome<ContactMessage>, AppError> {
        let message = self
            .store
            .mark_read(id, ctx.id())
            .await?
            .ok_or_else(|| AppError::not_found("Message"))?;

        Ok(Outcome::new(message))
    }
}
