//! Mock workspace data loaded at boot when `SEED_MOCK_DATA` is on.
//!
//! Records go through the service functions so every store invariant holds
//! (unique slugs and SKUs, order numbering, stock levels, primary domain).
//! Seeding runs against an instant, always-succeeding simulator that shares
//! the real stores, so a low `SIM_SUCCESS_RATE` cannot leave it half done.

use serde_json::json;
use tracing::info;

use crate::services::api_key::{self, ApiKeyError, NewApiKey};
use crate::services::audit::{self, NewAuditEntry};
use crate::services::builder::{self, BuilderError, ElementDraft};
use crate::services::commerce::{self, CommerceError, Customer, NewOrder, NewProduct, OrderLine, OrderStatus, ProductStatus};
use crate::services::domain::{self, DomainError};
use crate::services::help::{self, HelpError, NewArticle, NewTicket, Requester, TicketPriority, TicketReply, TicketStatus};
use crate::services::simulate::Simulator;
use crate::services::team::{self, ADMIN_ROLE, EDITOR_ROLE, NewInvite, NewRole, OWNER_ROLE, Permission, TeamError, VIEWER_ROLE};
use crate::services::webhook::{self, NewWebhook, WebhookError};
use crate::services::workflow::{self, NewWorkflow, WorkflowError};
use crate::state::AppState;
use crate::tree::ElementType;

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error(transparent)]
    Builder(#[from] BuilderError),
    #[error(transparent)]
    Commerce(#[from] CommerceError),
    #[error(transparent)]
    ApiKey(#[from] ApiKeyError),
    #[error(transparent)]
    Webhook(#[from] WebhookError),
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error(transparent)]
    Team(#[from] TeamError),
    #[error(transparent)]
    Help(#[from] HelpError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("system role missing: {0}")]
    MissingRole(&'static str),
}

/// Populate every store with a small, coherent demo workspace.
///
/// # Errors
///
/// Returns the first service error. Only possible if `state` already holds
/// conflicting records.
pub async fn seed(state: &AppState) -> Result<(), SeedError> {
    let seeding = AppState { simulator: Simulator::instant(), ..state.clone() };

    seed_team(&seeding).await?;
    seed_pages(&seeding).await?;
    seed_store(&seeding).await?;
    seed_integrations(&seeding).await?;
    seed_help(&seeding).await?;
    seed_domains(&seeding).await?;

    audit::record(state, NewAuditEntry::system("workspace.seeded", "workspace", "demo", "Loaded demo workspace data")).await;
    info!("mock data seeded");
    Ok(())
}

async fn role_id(state: &AppState, name: &'static str) -> Result<uuid::Uuid, SeedError> {
    let team = state.team.read().await;
    team.role_named(name).map(|r| r.id).ok_or(SeedError::MissingRole(name))
}

async fn seed_team(state: &AppState) -> Result<(), SeedError> {
    let owner = role_id(state, OWNER_ROLE).await?;
    let admin = role_id(state, ADMIN_ROLE).await?;
    let editor = role_id(state, EDITOR_ROLE).await?;
    let viewer = role_id(state, VIEWER_ROLE).await?;

    let support = team::create_role(
        state,
        NewRole {
            name: "Support".into(),
            description: "Answers customer tickets and reads the audit log".into(),
            permissions: vec![Permission::SupportManage, Permission::AuditView, Permission::OrdersManage],
        },
    )
    .await?;

    let people = [
        ("Alex Morgan", "alex@example.com", owner, true),
        ("Jordan Lee", "jordan@example.com", admin, true),
        ("Sam Rivera", "sam@example.com", editor, true),
        ("Casey Kim", "casey@example.com", support.id, true),
        ("Riley Chen", "riley@example.com", viewer, false),
    ];
    for (name, email, role_id, accepted) in people {
        let member = team::invite_member(state, NewInvite { name: name.into(), email: email.into(), role_id }).await?;
        if accepted {
            team::accept_invite(state, member.id).await?;
        }
    }
    Ok(())
}

async fn seed_pages(state: &AppState) -> Result<(), SeedError> {
    let home = builder::create_page(state, "Home", None).await?;
    builder::add_element(state, home.id, ElementDraft::new(ElementType::Header)).await?;
    let hero = builder::add_element(state, home.id, ElementDraft::new(ElementType::Section)).await?;
    builder::add_element(state, home.id, ElementDraft::new(ElementType::Text).under(hero.id.clone())).await?;
    builder::add_element(state, home.id, ElementDraft::new(ElementType::Button).under(hero.id)).await?;
    builder::add_element(state, home.id, ElementDraft::new(ElementType::Footer)).await?;
    builder::publish_page(state, home.id, true).await?;

    let about = builder::create_page(state, "About Us", None).await?;
    builder::add_element(state, about.id, ElementDraft::new(ElementType::Header)).await?;
    builder::add_element(state, about.id, ElementDraft::new(ElementType::Text)).await?;
    builder::add_element(state, about.id, ElementDraft::new(ElementType::Image)).await?;

    let contact = builder::create_page(state, "Contact", None).await?;
    builder::add_element(state, contact.id, ElementDraft::new(ElementType::Form)).await?;
    Ok(())
}

async fn seed_store(state: &AppState) -> Result<(), SeedError> {
    let catalog = [
        ("Classic Tee", "TEE-001", 2400, 42, "Apparel", ProductStatus::Active),
        ("Canvas Tote", "TOTE-001", 1800, 3, "Accessories", ProductStatus::Active),
        ("Ceramic Mug", "MUG-001", 1500, 25, "Home", ProductStatus::Active),
        ("Wool Beanie", "HAT-001", 2200, 0, "Apparel", ProductStatus::Active),
        ("Sticker Pack", "STK-001", 600, 120, "Accessories", ProductStatus::Draft),
        ("Enamel Pin", "PIN-001", 900, 15, "Accessories", ProductStatus::Archived),
    ];
    let mut ids = Vec::with_capacity(catalog.len());
    for (name, sku, price_cents, inventory, category, status) in catalog {
        let product = commerce::create_product(
            state,
            NewProduct {
                name: name.into(),
                description: format!("{name} from the demo catalog."),
                sku: sku.into(),
                price_cents,
                inventory,
                category: category.into(),
                status,
                images: Vec::new(),
            },
        )
        .await?;
        ids.push(product.id);
    }

    let orders = [
        ("Taylor Brooks", "taylor@example.com", vec![(ids[0], 2), (ids[2], 1)], true, Some(OrderStatus::Delivered)),
        ("Morgan Price", "morgan@example.com", vec![(ids[1], 1)], true, Some(OrderStatus::Shipped)),
        ("Jamie Fox", "jamie@example.com", vec![(ids[2], 3)], true, Some(OrderStatus::Processing)),
        ("Drew Park", "drew@example.com", vec![(ids[0], 1)], false, None),
        ("Quinn Hale", "quinn@example.com", vec![(ids[2], 1)], true, Some(OrderStatus::Cancelled)),
    ];
    for (name, email, lines, paid, status) in orders {
        let order = commerce::create_order(
            state,
            NewOrder {
                customer: Customer { name: name.into(), email: email.into() },
                items: lines.into_iter().map(|(product_id, quantity)| OrderLine { product_id, quantity }).collect(),
                shipping_address: Some("100 Market St, Springfield".into()),
                paid,
            },
        )
        .await?;
        // Walk the lifecycle so every step is a legal transition.
        let path: &[OrderStatus] = match status {
            Some(OrderStatus::Delivered) => &[OrderStatus::Processing, OrderStatus::Shipped, OrderStatus::Delivered],
            Some(OrderStatus::Shipped) => &[OrderStatus::Processing, OrderStatus::Shipped],
            Some(OrderStatus::Processing) => &[OrderStatus::Processing],
            Some(OrderStatus::Cancelled) => &[OrderStatus::Cancelled],
            _ => &[],
        };
        for next in path {
            commerce::update_order_status(state, order.id, *next).await?;
        }
    }
    Ok(())
}

async fn seed_integrations(state: &AppState) -> Result<(), SeedError> {
    let keys = [
        ("Payments", "stripe", "sk_test_demo_51HqLyj"),
        ("Email", "sendgrid", "SG.demo.key.9f2a"),
        ("Analytics", "google-analytics", "ga_demo_measure_77"),
    ];
    for (name, service, secret) in keys {
        api_key::create_api_key(state, NewApiKey { name: name.into(), service: service.into(), secret: secret.into() }).await?;
    }

    webhook::create_webhook(
        state,
        NewWebhook {
            name: "Fulfillment".into(),
            url: "https://fulfillment.example.com/hooks/orders".into(),
            events: vec!["order.created".into(), "order.updated".into()],
            active: true,
        },
    )
    .await?;
    webhook::create_webhook(
        state,
        NewWebhook {
            name: "Slack alerts".into(),
            url: "https://hooks.example.com/services/demo".into(),
            events: vec!["ticket.created".into(), "member.invited".into()],
            active: false,
        },
    )
    .await?;

    let flows = [
        json!({
            "name": "Thank big spenders",
            "description": "Email customers whose order is over $50",
            "trigger": {"event": "order.created"},
            "conditions": [{"field": "total_cents", "operator": "greater_than", "value": 5000}],
            "actions": [{"kind": "send_email", "config": {"template": "thank-you"}}],
            "active": true,
        }),
        json!({
            "name": "Low stock alert",
            "trigger": {"event": "product.updated"},
            "conditions": [{"field": "inventory", "operator": "less_than", "value": 5}],
            "actions": [{"kind": "notify", "config": {"channel": "inventory"}}, {"kind": "update_record", "config": {"tag": "restock"}}],
            "active": true,
        }),
        json!({
            "name": "Urgent ticket escalation",
            "trigger": {"event": "ticket.created"},
            "conditions": [{"field": "priority", "operator": "equals", "value": "urgent"}],
            "actions": [{"kind": "delay"}, {"kind": "send_webhook", "config": {"url": "https://pager.example.com"}}],
            "active": false,
        }),
    ];
    for flow in flows {
        let input: NewWorkflow = serde_json::from_value(flow).map_err(|e| WorkflowError::Validation(e.to_string()))?;
        workflow::create_workflow(state, input).await?;
    }
    Ok(())
}

async fn seed_help(state: &AppState) -> Result<(), SeedError> {
    let articles = [
        ("Getting started with the page builder", "Builder", "Build your first page.", "Drag a header, a section and a footer onto the canvas, then publish.", vec!["pages", "editor"]),
        ("Publishing your site", "Builder", "Make a page live.", "Use Publish on any page. A failed publish can be retried.", vec!["publish"]),
        ("Adding products", "Store", "Create and price products.", "Each product needs a unique SKU. Draft products are hidden from checkout.", vec!["sku", "inventory"]),
        ("Managing orders", "Store", "Fulfil, cancel and refund.", "Orders move from pending to processing, shipped and delivered. Cancelling restocks items.", vec!["orders", "refunds"]),
        ("Connecting a custom domain", "Domains", "Point your DNS at the platform.", "Add the A and CNAME records shown, then verify. SSL can be issued once the domain is active.", vec!["dns", "ssl"]),
        ("Inviting teammates", "Team", "Roles and permissions.", "Invite by email and pick a role. Owners cannot be removed while they are the last one.", vec!["roles", "invite"]),
        ("Using webhooks", "Integrations", "Receive store events.", "Each delivery is signed with your webhook secret using HMAC-SHA256.", vec!["webhooks", "signature"]),
    ];
    let ticket = {
        let mut store = state.help.write().await;
        for (title, category, summary, body, tags) in articles {
            store.add_article(NewArticle {
                title: title.into(),
                category: category.into(),
                summary: summary.into(),
                body: body.into(),
                tags: tags.into_iter().map(str::to_owned).collect(),
            })?;
        }
        drop(store);
        help::create_ticket(
            state,
            NewTicket {
                subject: "Domain stuck on pending".into(),
                description: "I added the DNS records yesterday but verification still fails.".into(),
                requester: Requester { name: "Taylor Brooks".into(), email: "taylor@example.com".into() },
                priority: TicketPriority::High,
            },
        )
        .await?
    };
    help::reply_ticket(
        state,
        ticket.id,
        TicketReply { author: "Casey Kim".into(), body: "DNS can take up to a day. Please retry verification.".into(), from_staff: true },
    )
    .await?;
    help::update_ticket_status(state, ticket.id, TicketStatus::InProgress).await?;

    help::create_ticket(
        state,
        NewTicket {
            subject: "How do I export orders?".into(),
            description: "Need a CSV for my accountant.".into(),
            requester: Requester { name: "Morgan Price".into(), email: "morgan@example.com".into() },
            priority: TicketPriority::Low,
        },
    )
    .await?;
    Ok(())
}

async fn seed_domains(state: &AppState) -> Result<(), SeedError> {
    domain::claim_subdomain(state, "demo-store").await?;
    let custom = domain::connect_domain(state, "shop.demo-store.com").await?;
    domain::verify_domain(state, custom.id).await?;
    domain::setup_ssl(state, custom.id).await?;
    domain::connect_domain(state, "demo-store.net").await?;
    Ok(())
}
