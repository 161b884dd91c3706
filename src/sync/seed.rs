//! Synthetic consumer catalog.
//!
//! The graph sync job re-applies this fixed demo data set on every tick.
//! It is not derived from live consume traffic and is independent of
//! message volume; there is no live subscription-registration protocol.

pub const SAMPLE_CONSUMERS: [&str; 30] = [
    "Fraud-Detection-Service",
    "RealTime-Analytics-Engine",
    "ML-Recommendation-System",
    "Data-Lake-Ingestor",
    "Elastic-Search-Indexer",
    "Security-Audit-Manager",
    "Customer-Notification-Hub",
    "Global-Billing-System",
    "Inventory-Replenishment-Bot",
    "Shipping-Tracking-Service",
    "Marketing-Automation-Tool",
    "Email-Service-Provider",
    "User-Profile-Manager",
    "Legacy-System-Bridge",
    "Cold-Storage-Archiver",
    "Spark-Streaming-Analytics",
    "Operational-Dashboard-UI",
    "Executive-Reporting-Tool",
    "Slack-Alert-Integration",
    "Webhook-Dispatcher-Service",
    "Mobile-Push-Notification",
    "Partner-Sync-Service",
    "Compliance-Verification-Node",
    "DDoS-Mitigation-Service",
    "Log-Aggregator-Splunk",
    "Database-Backup-Manager",
    "Performance-Monitoring-Node",
    "Order-Fulfillment-Service",
    "Refund-Processing-Unit",
    "Support-Ticket-AutoRouter",
];

pub const SAMPLE_TOPICS: [&str; 45] = [
    "UserLogins",
    "PaymentEvents",
    "ClickStream",
    "SystemLogs",
    "SecurityAlerts",
    "InventoryUpdates",
    "UserAnalytics",
    "ErrorLogs",
    "BillingEvents",
    "FrontendTelemetry",
    "DatabaseHealth",
    "EmailService",
    "AuthEvents",
    "OrderProcessing",
    "ShippingUpdates",
    "RefundRequests",
    "CustomerFeedback",
    "PromotionalEmails",
    "PasswordResets",
    "ApiGatewayLogs",
    "MobileAppEvents",
    "DesktopAppEvents",
    "PartnerIntegration",
    "CloudSyncEvents",
    "BackupStatus",
    "CacheInvalidations",
    "SessionExpirations",
    "SearchQueries",
    "ProductViews",
    "CartAdditions",
    "CheckoutStarted",
    "PaymentSuccess",
    "PaymentFailure",
    "CouponApplied",
    "ReviewSubmitted",
    "AccountCreated",
    "AccountDeleted",
    "NewsletterSub",
    "NewsletterUnsub",
    "SupportTickets",
    "LiveChatLogs",
    "InternalAudit",
    "ComplianceLogs",
    "FraudDetection",
    "MachineLearningInference",
];

/// The fixed (consumer, topic) subscription pairs: consumer `i` subscribes
/// to topic `i`, and the first consumer additionally subscribes to every
/// topic in the catalog.
pub fn subscriptions() -> Vec<(&'static str, &'static str)> {
    let mut pairs = Vec::new();
    for (index, consumer) in SAMPLE_CONSUMERS.iter().enumerate() {
        if let Some(topic) = SAMPLE_TOPICS.get(index) {
            pairs.push((*consumer, *topic));
        }
        if index == 0 {
            for topic in &SAMPLE_TOPICS {
                pairs.push((*consumer, *topic));
            }
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_is_fixed() {
        assert_eq!(SAMPLE_CONSUMERS.len(), 30);
        assert_eq!(SAMPLE_TOPICS.len(), 45);
    }

    #[test]
    fn first_consumer_subscribes_to_everything() {
        let pairs = subscriptions();
        let first = SAMPLE_CONSUMERS[0];
        let first_count = pairs.iter().filter(|(c, _)| *c == first).count();
        // One positional pair plus the full catalog.
        assert_eq!(first_count, SAMPLE_TOPICS.len() + 1);

        // Every other consumer gets exactly its positional topic.
        for (index, consumer) in SAMPLE_CONSUMERS.iter().enumerate().skip(1) {
            let count = pairs.iter().filter(|(c, _)| c == consumer).count();
            assert_eq!(count, 1, "consumer at index {index}");
        }
    }
}
