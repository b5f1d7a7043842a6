use uuid::Uuid;

/// Attachment URLs must live under the storage prefix, inside the
/// requesting user's own folder: `<prefix><user_id>/...`.
#[derive(Debug, Clone, Default)]
pub struct AttachmentPolicy {
    prefix: Option<String>,
}

impl AttachmentPolicy {
    pub fn new(prefix: Option<String>) -> Self {
        Self {
            prefix: prefix.filter(|p| !p.is_empty()),
        }
    }

    /// Returns false on the first URL outside the user's folder. With no
    /// prefix configured nothing can be verified, so any attachment fails.
    pub fn permits(&self, user_id: Uuid, urls: &[String]) -> bool {
        if urls.is_empty() {
            return true;
        }

        let Some(prefix) = self.prefix.as_deref() else {
            return false;
        };

        let user = user_id.to_string();
        urls.iter().all(|url| {
            url.strip_prefix(prefix)
                .map(|rest| rest.starts_with(&user))
                .unwrap_or(false)
        })
    }
}
