use std::sync::Arc;
use anyhow::Result;

use crate::config::AppSettings;
use crate::domain::employee::{Employee, EmployeeId};
use crate::messaging::EventPublisher;
use crate::metrics::Metrics;
use crate::persistence::core::{DomainAggregate, RootEntity};
use crate::persistence::store::KeyValueStore;
use crate::persistence::{Repository, UnitOfWork};

use super::aggregate::Company;
use super::commands::{CreateCompany, RegisterEmployee};
use super::errors::CompanyError;
use super::value_objects::CompanyId;

// ============================================================================
// Company Command Handler
// ============================================================================
//
// Orchestrates: Command → Aggregate → Repository → Unit of Work → Events
//
// Every command runs in its own unit of work.
//
// ============================================================================

pub struct CompanyCommandHandler<S: KeyValueStore, P: EventPublisher> {
    store: Arc<S>,
    publisher: Arc<P>,
    settings: AppSettings,
    metrics: Option<Arc<Metrics>>,
}

impl<S: KeyValueStore + 'static, P: EventPublisher> CompanyCommandHandler<S, P> {
    pub fn new(store: Arc<S>, publisher: Arc<P>, settings: AppSettings) -> Self {
        Self {
            store,
            publisher,
            settings,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn unit_of_work(&self) -> UnitOfWork<S, P> {
        let uow = UnitOfWork::new(
            self.store.clone(),
            self.publisher.clone(),
            self.settings.unit_of_work.clone(),
        );
        match &self.metrics {
            Some(metrics) => uow.with_metrics(metrics.clone()),
            None => uow,
        }
    }

    /// Create a company; its name must not be registered yet
    pub async fn create_company(&self, command: CreateCompany) -> Result<CompanyId> {
        let mut company = Company::create(&command.name, &command.address, command.country)?;
        let mut uow = self.unit_of_work();
        let companies = uow.repository::<Company>(&self.settings.company_table_name);

        if companies.find_by_id(&company.id).await?.is_some() {
            tracing::warn!(company_id = %company.id.value, "Company already exists");
            return Err(CompanyError::AlreadyExists(company.id.value.clone()).into());
        }

        let mut scope = uow.transaction();
        companies.put(&company)?;
        scope.publish_events(company.pull_events())?;
        scope.commit().await?;

        tracing::info!(company_id = %company.id.value, "Company was saved successfully");
        Ok(company.id)
    }

    pub async fn get_company(&self, company_id: &str) -> Result<Company> {
        let uow = self.unit_of_work();
        let companies = uow.repository::<Company>(&self.settings.company_table_name);

        let company = companies
            .find_by_id(&CompanyId::new(company_id))
            .await?
            .ok_or_else(|| CompanyError::NotFound(company_id.to_string()))?;
        Ok(company)
    }

    pub async fn enable_company(&self, company_id: &str) -> Result<Company> {
        self.change_status(company_id, Company::enable).await
    }

    pub async fn disable_company(&self, company_id: &str) -> Result<Company> {
        self.change_status(company_id, Company::disable).await
    }

    async fn change_status(
        &self,
        company_id: &str,
        transition: fn(&mut Company) -> Result<(), CompanyError>,
    ) -> Result<Company> {
        let mut company = self.get_company(company_id).await?;
        transition(&mut company)?;

        let mut uow = self.unit_of_work();
        let companies = uow.repository::<Company>(&self.settings.company_table_name);

        let mut scope = uow.transaction();
        companies.update(&company)?;
        scope.publish_events(company.pull_events())?;
        scope.commit().await?;

        tracing::info!(company_id = %company_id, status = ?company.status, "Company status updated");
        // The stored record is one version ahead of the loaded copy
        company.increase_version();
        Ok(company)
    }

    /// Register an employee for an enabled company
    pub async fn register_employee(&self, command: RegisterEmployee) -> Result<EmployeeId> {
        let company = self.get_company(&command.company_id).await?;
        if !company.is_enabled() {
            return Err(CompanyError::NotEnabled(command.company_id).into());
        }

        let mut employee = Employee::create(&command.name, &command.email, &company.id.value)?;
        let mut uow = self.unit_of_work();
        let employees = uow.repository::<Employee>(&self.settings.employee_table_name);

        let mut scope = uow.transaction();
        employees.put(&employee)?;
        scope.publish_events(employee.pull_events())?;
        scope.commit().await?;

        tracing::info!(
            company_id = %company.id.value,
            employee = %employee.id.email,
            "Employee registered"
        );
        Ok(employee.id)
    }

    /// Create many companies in one batch scope, chunked by the store limit
    pub async fn import_companies(&self, commands: Vec<CreateCompany>) -> Result<usize> {
        let mut companies = commands
            .iter()
            .map(|command| Company::create(&command.name, &command.address, command.country))
            .collect::<Result<Vec<_>, _>>()?;

        let mut uow = self.unit_of_work();
        let repository = uow.repository::<Company>(&self.settings.company_table_name);

        let mut scope = uow.batch();
        for company in &mut companies {
            repository.put(company)?;
            scope.publish_events(company.pull_events())?;
        }
        scope.commit().await?;

        tracing::info!(companies = companies.len(), "Companies imported");
        Ok(companies.len())
    }
}
