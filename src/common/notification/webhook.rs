use super::{NotificationError, NotificationImplementation};
use async_trait::async_trait;
use http::{header::CONTENT_TYPE, Request, StatusCode};
use hyper::{
    client::{Client, HttpConnector},
    Body,
};
use hyper_tls::HttpsConnector;
use std::time::Duration;
use tokio::time::timeout;

/// Triggers the downstream notification workflow over HTTP. The workflow
/// endpoint takes a receiver list and a composed email body and handles the
/// actual mail delivery.
pub struct WorkflowWebhook {
    client: Client<HttpsConnector<HttpConnector>>,
    endpoint_url: String,
    solution_name: String,
    management_domain: String,
    request_timeout: Duration,
    content: String,
    rule_id: String,
    rule_description: String,
    receivers: Option<Vec<String>>,
}

impl WorkflowWebhook {
    pub fn new(
        endpoint_url: &str,
        solution_name: &str,
        management_domain: &str,
        request_timeout: Duration,
    ) -> WorkflowWebhook {
        let mut builder = Client::builder();
        builder.pool_idle_timeout(Duration::from_secs(90));

        WorkflowWebhook {
            client: builder.build(HttpsConnector::new()),
            endpoint_url: endpoint_url.to_string(),
            solution_name: solution_name.to_string(),
            management_domain: management_domain.to_string(),
            request_timeout,
            content: String::new(),
            rule_id: String::new(),
            rule_description: String::new(),
            receivers: None,
        }
    }

    /// Deep link to the rule maintenance page of the solution portal.
    fn rule_detail_url(&self) -> String {
        format!(
            "https://{}.{}/maintenance/rule/{}",
            self.solution_name, self.management_domain, self.rule_id
        )
    }

    // The email body is consumed verbatim by the downstream workflow, so the
    // concatenation has to stay exactly as it is, double space and missing
    // separators included.
    fn email_template(&self) -> String {
        format!(
            "Alarm fired for rule ID: {}  Rule Description: {} Custom Message: {}Alarm Detail Page: {}",
            self.rule_id,
            self.rule_description,
            self.content,
            self.rule_detail_url()
        )
    }

    fn payload(&self, receivers: &[String]) -> String {
        serde_json::json!({
            "emailAddress": receivers,
            "template": self.email_template(),
        })
        .to_string()
    }
}

#[async_trait]
impl NotificationImplementation for WorkflowWebhook {
    fn set_receiver(&mut self, receivers: Vec<String>) {
        self.receivers = Some(receivers);
    }

    fn set_message(&mut self, message: &str, rule_id: &str, rule_description: &str) {
        self.content = message.to_string();
        self.rule_id = rule_id.to_string();
        self.rule_description = rule_description.to_string();
    }

    async fn execute(&self) -> Result<StatusCode, NotificationError> {
        let receivers = self
            .receivers
            .as_ref()
            .ok_or(NotificationError::MissingReceiver)?;

        let request = Request::post(self.endpoint_url.as_str())
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(self.payload(receivers)))
            .map_err(|_| NotificationError::Connection)?;

        let response = timeout(self.request_timeout, self.client.request(request))
            .await
            .map_err(|_| NotificationError::Timeout)?
            .map_err(|_| NotificationError::Connection)?;

        Ok(response.status())
    }
}
