use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use uow_persistence::config::AppSettings;
use uow_persistence::domain::company::{CompanyCommandHandler, Country, CreateCompany, RegisterEmployee};
use uow_persistence::messaging::{EventBusPublisher, InMemoryEventBus};
use uow_persistence::metrics::Metrics;
use uow_persistence::persistence::store::InMemoryStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,uow_persistence=debug")),
        )
        .init();

    tracing::info!("🚀 Starting unit of work demo");

    // === 1. Settings from the environment ===
    let settings = AppSettings::from_env()?;
    tracing::info!(
        company_table = %settings.company_table_name,
        employee_table = %settings.employee_table_name,
        event_bus = %settings.publisher.event_bus_name,
        "Settings loaded"
    );

    // === 2. Initialize Prometheus metrics ===
    let metrics = Arc::new(Metrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metrics", metrics.registry().gather().len());

    // === 3. Store and event bus ===
    let store = Arc::new(InMemoryStore::new());
    let bus = Arc::new(InMemoryEventBus::new());
    let publisher = Arc::new(
        EventBusPublisher::new(bus.clone(), settings.publisher.clone()).with_metrics(metrics.clone()),
    );

    let handler = CompanyCommandHandler::new(store.clone(), publisher, settings.clone())
        .with_metrics(metrics.clone());

    // === 4. Company lifecycle in transaction scopes ===
    let company_id = handler
        .create_company(CreateCompany {
            name: "SOLES SA".to_string(),
            address: "Av. Corrientes 1234".to_string(),
            country: Country::Arg,
        })
        .await?;
    tracing::info!("✅ Company created: {}", company_id.value);

    let employee_id = handler
        .register_employee(RegisterEmployee {
            company_id: company_id.value.clone(),
            name: "Ana".to_string(),
            email: "ana@soles.com".to_string(),
        })
        .await?;
    tracing::info!("✅ Employee registered: {}", employee_id.email);

    let company = handler.disable_company(&company_id.value).await?;
    tracing::info!("✅ Company disabled: {} (version {})", company.id.value, company.metadata.version);

    // Rejected: the company is disabled now
    if let Err(error) = handler
        .register_employee(RegisterEmployee {
            company_id: company_id.value.clone(),
            name: "Luis".to_string(),
            email: "luis@soles.com".to_string(),
        })
        .await
    {
        tracing::warn!(error = %error, "Employee registration rejected");
    }

    // === 5. Bulk import in a batch scope ===
    let imports = (1..=250)
        .map(|n| CreateCompany {
            name: format!("Imported {n:03}"),
            address: format!("{n} Import Street"),
            country: Country::Usa,
        })
        .collect();
    let calls_before = store.write_calls().await.len();
    let imported = handler.import_companies(imports).await?;
    tracing::info!(
        "✅ Imported {} companies in {} store transactions",
        imported,
        store.write_calls().await.len() - calls_before
    );

    tracing::info!(
        "📨 {} events accepted by the event bus",
        bus.published_entries().await.len()
    );
    println!("{}", metrics.render()?);

    tracing::info!("🎉 Demo complete!");

    Ok(())
}
