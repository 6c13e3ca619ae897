//! CSV import and export for leads, people, customers and support cases.
//!
//! Each entity declares its columns once in [`ExchangeEntity::columns`]; the
//! exporter writes them as the header row and the importer looks fields up by
//! header name (case-insensitive, any order, unknown headers ignored).

use std::collections::HashMap;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

use nimbus_contacts::{Company, CompanyId, CompanyKind, ContactInfo, Person};
use nimbus_core::{AggregateRoot, TenantId, UserId};
use nimbus_pipeline::{Lead, LeadDetails, LeadStatus};
use nimbus_support::{CaseDetails, CasePriority, CaseStatus, SupportCase};

use crate::crm::{CommandContext, Crm};
use crate::services::{ConvertOptions, NewCompany, NewPerson, ServiceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeEntity {
    Leads,
    People,
    Customers,
    SupportCases,
}

const LEAD_COLUMNS: &[&str] = &[
    "first_name",
    "last_name",
    "company_name",
    "email",
    "phone",
    "source",
    "status",
];
const PERSON_COLUMNS: &[&str] = &["first_name", "last_name", "email", "phone", "job_title", "company"];
const CUSTOMER_COLUMNS: &[&str] = &["name", "email", "phone", "website", "address", "account_owner"];
const CASE_COLUMNS: &[&str] = &[
    "case_number",
    "subject",
    "description",
    "priority",
    "status",
    "case_type",
    "origin",
    "company",
    "assignee",
    "resolution",
];

impl ExchangeEntity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeEntity::Leads => "leads",
            ExchangeEntity::People => "people",
            ExchangeEntity::Customers => "customers",
            ExchangeEntity::SupportCases => "support_cases",
        }
    }

    /// Header row, in export order.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            ExchangeEntity::Leads => LEAD_COLUMNS,
            ExchangeEntity::People => PERSON_COLUMNS,
            ExchangeEntity::Customers => CUSTOMER_COLUMNS,
            ExchangeEntity::SupportCases => CASE_COLUMNS,
        }
    }

    /// Headers an import file must carry.
    fn required(&self) -> &'static [&'static str] {
        match self {
            ExchangeEntity::Leads | ExchangeEntity::People => &["first_name", "last_name"],
            ExchangeEntity::Customers => &["name"],
            ExchangeEntity::SupportCases => &["subject"],
        }
    }
}

impl FromStr for ExchangeEntity {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "leads" => Ok(Self::Leads),
            "people" => Ok(Self::People),
            "customers" => Ok(Self::Customers),
            "support_cases" | "cases" => Ok(Self::SupportCases),
            other => Err(ExchangeError::UnknownEntity(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("unknown exchange entity '{0}'")]
    UnknownEntity(String),

    #[error("missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("csv output is not valid UTF-8")]
    Encoding,
}

/// One rejected import row. `row` counts data rows from 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    pub row: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub entity: ExchangeEntity,
    pub created: usize,
    pub failed: Vec<RowError>,
}

pub struct ExchangeService<'a> {
    crm: &'a Crm,
}

impl Crm {
    pub fn exchange(&self) -> ExchangeService<'_> {
        ExchangeService { crm: self }
    }
}

impl<'a> ExchangeService<'a> {
    pub fn export_csv(&self, tenant_id: TenantId, entity: ExchangeEntity) -> Result<String, ExchangeError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(entity.columns())?;

        let rows = match entity {
            ExchangeEntity::Leads => self
                .crm
                .leads()
                .list(tenant_id, None)
                .iter()
                .map(lead_row)
                .collect::<Vec<_>>(),
            ExchangeEntity::People => {
                let names = self.company_names(tenant_id);
                self.crm
                    .contacts()
                    .list_people(tenant_id, None)
                    .iter()
                    .map(|p| person_row(p, &names))
                    .collect()
            }
            ExchangeEntity::Customers => self
                .crm
                .contacts()
                .list_companies(tenant_id, Some(CompanyKind::Customer))
                .iter()
                .map(customer_row)
                .collect(),
            ExchangeEntity::SupportCases => {
                let names = self.company_names(tenant_id);
                self.crm
                    .support()
                    .list(tenant_id, None, None)
                    .iter()
                    .map(|c| case_row(c, &names))
                    .collect()
            }
        };
        for row in &rows {
            writer.write_record(row)?;
        }

        let bytes = writer.into_inner().map_err(|e| ExchangeError::Csv(e.into_error().into()))?;
        let body = String::from_utf8(bytes).map_err(|_| ExchangeError::Encoding)?;
        tracing::info!(tenant_id = %tenant_id, entity = entity.as_str(), rows = rows.len(), "export written");
        Ok(body)
    }

    /// Creates one record per data row. Rows that fail are reported and
    /// skipped; only an unreadable file or missing required headers fail the
    /// whole import.
    pub fn import_csv(
        &self,
        ctx: &CommandContext,
        entity: ExchangeEntity,
        data: &[u8],
    ) -> Result<ImportReport, ExchangeError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(data);

        let headers: HashMap<String, usize> = reader
            .headers()?
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim().to_ascii_lowercase(), i))
            .collect();
        let missing: Vec<String> = entity
            .required()
            .iter()
            .filter(|c| !headers.contains_key(**c))
            .map(|c| c.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ExchangeError::MissingColumns(missing));
        }

        let mut report = ImportReport {
            entity,
            created: 0,
            failed: Vec::new(),
        };
        for (idx, record) in reader.records().enumerate() {
            let row_no = idx + 1;
            let outcome = record
                .map_err(|e| e.to_string())
                .and_then(|record| {
                    let row = Row {
                        headers: &headers,
                        record: &record,
                    };
                    self.import_row(ctx, entity, &row)
                });
            match outcome {
                Ok(()) => report.created += 1,
                Err(message) => {
                    tracing::debug!(tenant_id = %ctx.tenant_id, entity = entity.as_str(), row = row_no, reason = %message, "import row rejected");
                    report.failed.push(RowError { row: row_no, message });
                }
            }
        }

        tracing::info!(
            tenant_id = %ctx.tenant_id,
            entity = entity.as_str(),
            created = report.created,
            failed = report.failed.len(),
            "import finished"
        );
        Ok(report)
    }

    fn import_row(&self, ctx: &CommandContext, entity: ExchangeEntity, row: &Row<'_>) -> Result<(), String> {
        match entity {
            ExchangeEntity::Leads => self.import_lead(ctx, row),
            ExchangeEntity::People => self.import_person(ctx, row),
            ExchangeEntity::Customers => self.import_customer(ctx, row),
            ExchangeEntity::SupportCases => self.import_case(ctx, row),
        }
    }

    /// A converted lead is replayed through conversion, so it brings its
    /// person, opportunity and (when named) company with it.
    fn import_lead(&self, ctx: &CommandContext, row: &Row<'_>) -> Result<(), String> {
        let status = row.parse::<LeadStatus>("status")?.unwrap_or(LeadStatus::New);
        let details = LeadDetails {
            first_name: row.text("first_name"),
            last_name: row.text("last_name"),
            company_name: row.get("company_name"),
            email: row.get("email"),
            phone: row.get("phone"),
            source: row.get("source"),
        };
        let leads = self.crm.leads();
        let lead = leads.create(ctx, details).map_err(message)?;
        match status {
            LeadStatus::New => {}
            LeadStatus::Converted => {
                leads
                    .convert(ctx, *lead.id(), ConvertOptions::default())
                    .map_err(message)?;
            }
            other => {
                leads.change_status(ctx, *lead.id(), other).map_err(message)?;
            }
        }
        Ok(())
    }

    fn import_person(&self, ctx: &CommandContext, row: &Row<'_>) -> Result<(), String> {
        let company_id = self.company_by_name(ctx.tenant_id, row.get("company"))?;
        self.crm
            .contacts()
            .create_person(
                ctx,
                NewPerson {
                    first_name: row.text("first_name"),
                    last_name: row.text("last_name"),
                    email: row.get("email"),
                    phone: row.get("phone"),
                    job_title: row.get("job_title"),
                    company_id,
                },
            )
            .map_err(message)?;
        Ok(())
    }

    fn import_customer(&self, ctx: &CommandContext, row: &Row<'_>) -> Result<(), String> {
        let account_owner = row.parse::<uuid::Uuid>("account_owner")?.map(UserId::from_uuid);
        self.crm
            .contacts()
            .create_company(
                ctx,
                NewCompany {
                    kind: CompanyKind::Customer,
                    name: row.text("name"),
                    contact: ContactInfo {
                        email: row.get("email"),
                        phone: row.get("phone"),
                        website: row.get("website"),
                        address: row.get("address"),
                    },
                    account_owner,
                },
            )
            .map_err(message)?;
        Ok(())
    }

    /// Imported cases take the next number in the target tenant; the
    /// `case_number` column is ignored. Status is rebuilt by replaying the
    /// transitions that lead to it.
    fn import_case(&self, ctx: &CommandContext, row: &Row<'_>) -> Result<(), String> {
        let company_id = self.company_by_name(ctx.tenant_id, row.get("company"))?;
        let status = row.parse::<CaseStatus>("status")?.unwrap_or(CaseStatus::New);
        let assignee = row.parse::<uuid::Uuid>("assignee")?.map(UserId::from_uuid);
        let resolution = row.get("resolution");
        match (status, assignee.is_some(), resolution.is_some()) {
            (CaseStatus::New, true, _) => return Err("a new case cannot have an assignee".into()),
            (CaseStatus::Assigned, false, _) => return Err("an assigned case needs an assignee".into()),
            (CaseStatus::Resolved | CaseStatus::Closed, _, false) => {
                return Err(format!("a {} case needs a resolution", status.as_str()))
            }
            (s, _, true) if s.is_open() => {
                return Err(format!("a {} case cannot have a resolution", s.as_str()))
            }
            _ => {}
        }

        let details = CaseDetails {
            subject: row.text("subject"),
            description: row.get("description"),
            priority: row.parse::<CasePriority>("priority")?.unwrap_or(CasePriority::Medium),
            case_type: row.get("case_type"),
            origin: row.get("origin"),
            company_id,
            contact_id: None,
        };
        let support = self.crm.support();
        let case_id = *support.open(ctx, details).map_err(message)?.id();
        if let Some(user) = assignee {
            support.assign(ctx, case_id, user).map_err(message)?;
        }
        match status {
            CaseStatus::New | CaseStatus::Assigned => {}
            CaseStatus::InProgress | CaseStatus::Pending => {
                support.change_status(ctx, case_id, status).map_err(message)?;
            }
            CaseStatus::Resolved | CaseStatus::Closed => {
                support
                    .resolve(ctx, case_id, resolution.unwrap_or_default())
                    .map_err(message)?;
                if status == CaseStatus::Closed {
                    support
                        .change_status(ctx, case_id, CaseStatus::Closed)
                        .map_err(message)?;
                }
            }
        }
        Ok(())
    }

    fn company_by_name(&self, tenant_id: TenantId, name: Option<String>) -> Result<Option<CompanyId>, String> {
        match name {
            Some(name) => self
                .crm
                .contacts()
                .find_company_by_name(tenant_id, &name)
                .map(|c| Some(*c.id()))
                .ok_or_else(|| format!("unknown company '{name}'")),
            None => Ok(None),
        }
    }

    fn company_names(&self, tenant_id: TenantId) -> HashMap<CompanyId, String> {
        self.crm
            .read()
            .companies
            .list(tenant_id)
            .into_iter()
            .map(|c| (*c.id(), c.name().to_string()))
            .collect()
    }
}

fn message(err: ServiceError) -> String {
    err.to_string()
}

struct Row<'r> {
    headers: &'r HashMap<String, usize>,
    record: &'r csv::StringRecord,
}

impl Row<'_> {
    /// Trimmed non-empty cell.
    fn get(&self, column: &str) -> Option<String> {
        self.headers
            .get(column)
            .and_then(|i| self.record.get(*i))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    fn text(&self, column: &str) -> String {
        self.get(column).unwrap_or_default()
    }

    fn parse<T>(&self, column: &str) -> Result<Option<T>, String>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(column)
            .map(|v| v.parse::<T>().map_err(|e| format!("{column}: {e}")))
            .transpose()
    }
}

fn opt(value: Option<&str>) -> String {
    value.unwrap_or_default().to_string()
}

fn lead_row(lead: &Lead) -> Vec<String> {
    let d = lead.details();
    vec![
        d.first_name.clone(),
        d.last_name.clone(),
        opt(d.company_name.as_deref()),
        opt(d.email.as_deref()),
        opt(d.phone.as_deref()),
        opt(d.source.as_deref()),
        lead.status().as_str().to_string(),
    ]
}

fn person_row(person: &Person, companies: &HashMap<CompanyId, String>) -> Vec<String> {
    vec![
        person.first_name().to_string(),
        person.last_name().to_string(),
        opt(person.email()),
        opt(person.phone()),
        opt(person.job_title()),
        opt(person.company_id().and_then(|id| companies.get(&id)).map(String::as_str)),
    ]
}

fn customer_row(company: &Company) -> Vec<String> {
    let c = company.contact();
    vec![
        company.name().to_string(),
        opt(c.email.as_deref()),
        opt(c.phone.as_deref()),
        opt(c.website.as_deref()),
        opt(c.address.as_deref()),
        company.account_owner().map(|u| u.to_string()).unwrap_or_default(),
    ]
}

fn case_row(case: &SupportCase, companies: &HashMap<CompanyId, String>) -> Vec<String> {
    let d = case.details();
    vec![
        case.case_number().to_string(),
        d.subject.clone(),
        opt(d.description.as_deref()),
        d.priority.as_str().to_string(),
        case.status().as_str().to_string(),
        opt(d.case_type.as_deref()),
        opt(d.origin.as_deref()),
        opt(d.company_id.and_then(|id| companies.get(&id)).map(String::as_str)),
        case.assignee().map(|u| u.to_string()).unwrap_or_default(),
        opt(case.resolution()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::CrmSettings;
    use proptest::prelude::*;

    fn ctx() -> CommandContext {
        CommandContext::new(TenantId::new(), None)
    }

    /// Data rows as a sorted list so record order does not matter.
    fn body_rows(csv: &str) -> Vec<String> {
        let mut rows: Vec<String> = csv.lines().skip(1).map(str::to_string).collect();
        rows.sort();
        rows
    }

    #[test]
    fn export_starts_with_the_declared_header() {
        let crm = Crm::in_memory(CrmSettings::default());
        let out = crm.exchange().export_csv(TenantId::new(), ExchangeEntity::Customers).unwrap();
        assert_eq!(out.trim_end(), "name,email,phone,website,address,account_owner");
    }

    #[test]
    fn bad_rows_are_reported_and_skipped() {
        let crm = Crm::in_memory(CrmSettings::default());
        let ctx = ctx();
        let data = b"first_name,last_name,email,status\n\
                     Jane,Doe,jane@acme.com,qualified\n\
                     ,,nobody@x.io,\n\
                     Bob,Stone,not-an-email,\n\
                     Ann,Lee,,sleeping\n";
        let report = crm.exchange().import_csv(&ctx, ExchangeEntity::Leads, data).unwrap();

        assert_eq!(report.created, 1);
        let rows: Vec<usize> = report.failed.iter().map(|f| f.row).collect();
        assert_eq!(rows, vec![2, 3, 4]);
        let leads = crm.leads().list(ctx.tenant_id, None);
        assert_eq!(leads[0].status(), LeadStatus::Qualified);
    }

    #[test]
    fn missing_required_headers_fail_the_import() {
        let crm = Crm::in_memory(CrmSettings::default());
        let err = crm
            .exchange()
            .import_csv(&ctx(), ExchangeEntity::Customers, b"email\nx@y.io\n")
            .unwrap_err();
        assert!(matches!(err, ExchangeError::MissingColumns(cols) if cols == vec!["name".to_string()]));
    }

    #[test]
    fn people_resolve_companies_by_name() {
        let crm = Crm::in_memory(CrmSettings::default());
        let ctx = ctx();
        crm.exchange()
            .import_csv(&ctx, ExchangeEntity::Customers, b"name,email\nAcme,info@acme.com\n")
            .unwrap();
        let report = crm
            .exchange()
            .import_csv(
                &ctx,
                ExchangeEntity::People,
                b"first_name,last_name,company\nJane,Doe,acme\nBob,Stone,Globex\n",
            )
            .unwrap();
        assert_eq!(report.created, 1);
        assert_eq!(report.failed[0].message, "unknown company 'Globex'");

        let out = crm.exchange().export_csv(ctx.tenant_id, ExchangeEntity::People).unwrap();
        assert_eq!(body_rows(&out), vec!["Jane,Doe,,,,Acme".to_string()]);
    }

    #[test]
    fn imported_cases_get_fresh_numbers() {
        let crm = Crm::in_memory(CrmSettings::default());
        let ctx = ctx();
        let data = b"case_number,subject,priority,status,resolution\nCS-000900,Printer jams,high,closed,Replaced fuser\n";
        crm.exchange().import_csv(&ctx, ExchangeEntity::SupportCases, data).unwrap();

        let cases = crm.support().list(ctx.tenant_id, None, None);
        assert_eq!(cases[0].case_number(), "CS-000001");
        assert_eq!(cases[0].details().priority, CasePriority::High);
        assert_eq!(cases[0].status(), CaseStatus::Closed);
        assert_eq!(cases[0].resolution(), Some("Replaced fuser"));
    }

    #[test]
    fn resolved_case_exports_the_same_after_import() {
        let crm = Crm::in_memory(CrmSettings::default());
        let (source, target) = (ctx(), ctx());
        let case = crm
            .support()
            .open(
                &source,
                CaseDetails {
                    subject: "Printer".into(),
                    description: None,
                    priority: CasePriority::Medium,
                    case_type: None,
                    origin: None,
                    company_id: None,
                    contact_id: None,
                },
            )
            .unwrap();
        crm.support().resolve(&source, *case.id(), "Cleared the jam".into()).unwrap();

        let first = crm.exchange().export_csv(source.tenant_id, ExchangeEntity::SupportCases).unwrap();
        let report = crm
            .exchange()
            .import_csv(&target, ExchangeEntity::SupportCases, first.as_bytes())
            .unwrap();
        assert!(report.failed.is_empty(), "{:?}", report.failed);
        let second = crm.exchange().export_csv(target.tenant_id, ExchangeEntity::SupportCases).unwrap();

        assert_eq!(first, second);
        let imported = crm.support().list(target.tenant_id, None, None);
        assert_eq!(imported[0].status(), CaseStatus::Resolved);
    }

    #[test]
    fn case_rows_with_inconsistent_status_are_rejected() {
        let crm = Crm::in_memory(CrmSettings::default());
        let ctx = ctx();
        let agent = UserId::new();
        let data = format!(
            "subject,status,assignee,resolution\n\
             A,assigned,,\n\
             B,resolved,,\n\
             C,new,{agent},\n\
             D,pending,,Fixed\n\
             E,assigned,{agent},\n"
        );
        let report = crm
            .exchange()
            .import_csv(&ctx, ExchangeEntity::SupportCases, data.as_bytes())
            .unwrap();

        assert_eq!(report.created, 1);
        let messages: Vec<&str> = report.failed.iter().map(|f| f.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "an assigned case needs an assignee",
                "a resolved case needs a resolution",
                "a new case cannot have an assignee",
                "a pending case cannot have a resolution",
            ]
        );
        let cases = crm.support().list(ctx.tenant_id, None, None);
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].status(), CaseStatus::Assigned);
        assert_eq!(cases[0].assignee(), Some(agent));
    }

    #[test]
    fn converted_leads_are_converted_again_on_import() {
        let crm = Crm::in_memory(CrmSettings::default());
        let (source, target) = (ctx(), ctx());
        let lead = crm
            .leads()
            .create(
                &source,
                LeadDetails {
                    first_name: "Jane".into(),
                    last_name: "Doe".into(),
                    company_name: Some("Acme".into()),
                    email: Some("jane@acme.com".into()),
                    phone: None,
                    source: None,
                },
            )
            .unwrap();
        crm.leads().convert(&source, *lead.id(), ConvertOptions::default()).unwrap();

        let first = crm.exchange().export_csv(source.tenant_id, ExchangeEntity::Leads).unwrap();
        let report = crm.exchange().import_csv(&target, ExchangeEntity::Leads, first.as_bytes()).unwrap();
        assert!(report.failed.is_empty(), "{:?}", report.failed);
        let second = crm.exchange().export_csv(target.tenant_id, ExchangeEntity::Leads).unwrap();

        assert_eq!(first, second);
        assert!(crm.contacts().find_company_by_name(target.tenant_id, "Acme").is_some());
        assert_eq!(crm.contacts().list_people(target.tenant_id, None).len(), 1);
    }

    fn arb_lead_row() -> impl Strategy<Value = (String, String, Option<String>, Option<String>, Option<String>)> {
        (
            "[A-Z][a-z]{1,8}",
            "[A-Z][a-z]{0,8}",
            proptest::option::of("[A-Z][a-z]{1,6}( [A-Z][a-z]{1,6})?"),
            proptest::option::of("[a-z]{1,6}@[a-z]{1,6}\\.com"),
            proptest::option::of("\\+?[0-9]{7,12}"),
        )
    }

    fn arb_person_row() -> impl Strategy<Value = (String, String, Option<String>, Option<String>, Option<String>)> {
        (
            "[A-Z][a-z]{1,8}",
            "[A-Z][a-z]{0,8}",
            proptest::option::of("[a-z]{1,6}@[a-z]{1,6}\\.com"),
            proptest::option::of("[A-Z][a-z]{2,8}( [A-Z][a-z]{2,8})?"),
            proptest::option::of(0usize..3),
        )
            .prop_map(|(first, last, email, title, company)| {
                (first, last, email, title, company.map(|i| format!("Company {i}")))
            })
    }

    fn arb_customer_row() -> impl Strategy<Value = (String, Option<String>, Option<String>, Option<String>, bool)> {
        (
            "[A-Z][a-z]{1,10}",
            proptest::option::of("\\+?[0-9]{7,12}"),
            proptest::option::of("https://[a-z]{1,8}\\.com"),
            proptest::option::of("[0-9]{1,3} [A-Z][a-z]{2,8} St, [A-Z][a-z]{2,8}"),
            any::<bool>(),
        )
    }

    /// Where a generated case ends up before export.
    #[derive(Debug, Clone, Copy)]
    enum CaseEnd {
        Open(CaseStatus),
        Resolved,
        Closed,
        Reopened,
    }

    fn arb_case_row() -> impl Strategy<Value = (String, Option<String>, CasePriority, CaseEnd, bool)> {
        let end = prop_oneof![
            Just(CaseEnd::Open(CaseStatus::New)),
            Just(CaseEnd::Open(CaseStatus::Assigned)),
            Just(CaseEnd::Open(CaseStatus::InProgress)),
            Just(CaseEnd::Open(CaseStatus::Pending)),
            Just(CaseEnd::Resolved),
            Just(CaseEnd::Closed),
            Just(CaseEnd::Reopened),
        ];
        let priority = prop_oneof![
            Just(CasePriority::Low),
            Just(CasePriority::Medium),
            Just(CasePriority::High),
            Just(CasePriority::Urgent),
        ];
        (
            "[A-Z][a-z]{2,10}( [a-z]{2,8})?",
            proptest::option::of("[A-Z][a-z]{2,8}, [a-z]{2,8}\\."),
            priority,
            end,
            any::<bool>(),
        )
    }

    /// Opens a case and walks it to `end` through the service.
    fn drive_case(crm: &Crm, ctx: &CommandContext, subject: String, description: Option<String>, priority: CasePriority, end: CaseEnd, assign: bool) {
        let support = crm.support();
        let details = CaseDetails {
            subject,
            description,
            priority,
            case_type: None,
            origin: None,
            company_id: None,
            contact_id: None,
        };
        let id = *support.open(ctx, details).unwrap().id();
        let needs_assignee = matches!(end, CaseEnd::Open(CaseStatus::Assigned));
        if (assign && !matches!(end, CaseEnd::Open(CaseStatus::New))) || needs_assignee {
            support.assign(ctx, id, UserId::new()).unwrap();
        }
        match end {
            CaseEnd::Open(CaseStatus::InProgress) => {
                support.change_status(ctx, id, CaseStatus::InProgress).unwrap();
            }
            CaseEnd::Open(CaseStatus::Pending) => {
                support.change_status(ctx, id, CaseStatus::Pending).unwrap();
            }
            CaseEnd::Open(_) => {}
            CaseEnd::Resolved => {
                support.resolve(ctx, id, "Fixed".into()).unwrap();
            }
            CaseEnd::Closed => {
                support.resolve(ctx, id, "Fixed, confirmed".into()).unwrap();
                support.change_status(ctx, id, CaseStatus::Closed).unwrap();
            }
            CaseEnd::Reopened => {
                support.resolve(ctx, id, "Fixed".into()).unwrap();
                support.reopen(ctx, id).unwrap();
            }
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn lead_export_import_round_trips(rows in proptest::collection::vec(arb_lead_row(), 1..6)) {
            let crm = Crm::in_memory(CrmSettings::default());
            let (source, target) = (ctx(), ctx());
            for (first, last, company, email, phone) in rows {
                let details = LeadDetails {
                    first_name: first,
                    last_name: last,
                    company_name: company,
                    email,
                    phone,
                    source: Some("web".into()),
                };
                crm.leads().create(&source, details).unwrap();
            }

            let first = crm.exchange().export_csv(source.tenant_id, ExchangeEntity::Leads).unwrap();
            let report = crm.exchange().import_csv(&target, ExchangeEntity::Leads, first.as_bytes()).unwrap();
            prop_assert!(report.failed.is_empty());
            let second = crm.exchange().export_csv(target.tenant_id, ExchangeEntity::Leads).unwrap();
            prop_assert_eq!(body_rows(&first), body_rows(&second));
        }

        #[test]
        fn people_export_import_round_trips(rows in proptest::collection::vec(arb_person_row(), 1..6)) {
            let crm = Crm::in_memory(CrmSettings::default());
            let (source, target) = (ctx(), ctx());
            for i in 0..3 {
                let customers = format!("name\nCompany {i}\n");
                for c in [&source, &target] {
                    crm.exchange().import_csv(c, ExchangeEntity::Customers, customers.as_bytes()).unwrap();
                }
            }
            for (first, last, email, job_title, company) in rows {
                let company_id = company
                    .and_then(|name| crm.contacts().find_company_by_name(source.tenant_id, &name))
                    .map(|c| *c.id());
                let person = NewPerson { first_name: first, last_name: last, email, phone: None, job_title, company_id };
                crm.contacts().create_person(&source, person).unwrap();
            }

            let first = crm.exchange().export_csv(source.tenant_id, ExchangeEntity::People).unwrap();
            let report = crm.exchange().import_csv(&target, ExchangeEntity::People, first.as_bytes()).unwrap();
            prop_assert!(report.failed.is_empty(), "{:?}", report.failed);
            let second = crm.exchange().export_csv(target.tenant_id, ExchangeEntity::People).unwrap();
            prop_assert_eq!(body_rows(&first), body_rows(&second));
        }

        #[test]
        fn customer_export_import_round_trips(rows in proptest::collection::vec(arb_customer_row(), 1..6)) {
            let crm = Crm::in_memory(CrmSettings::default());
            let (source, target) = (ctx(), ctx());
            for (i, (name, phone, website, address, owned)) in rows.into_iter().enumerate() {
                let company = NewCompany {
                    kind: CompanyKind::Customer,
                    name: format!("{name} {i}"),
                    contact: ContactInfo { email: None, phone, website, address },
                    account_owner: owned.then(UserId::new),
                };
                crm.contacts().create_company(&source, company).unwrap();
            }

            let first = crm.exchange().export_csv(source.tenant_id, ExchangeEntity::Customers).unwrap();
            let report = crm.exchange().import_csv(&target, ExchangeEntity::Customers, first.as_bytes()).unwrap();
            prop_assert!(report.failed.is_empty(), "{:?}", report.failed);
            let second = crm.exchange().export_csv(target.tenant_id, ExchangeEntity::Customers).unwrap();
            prop_assert_eq!(body_rows(&first), body_rows(&second));
        }

        #[test]
        fn case_export_import_round_trips(rows in proptest::collection::vec(arb_case_row(), 1..8)) {
            let crm = Crm::in_memory(CrmSettings::default());
            let (source, target) = (ctx(), ctx());
            for (subject, description, priority, end, assign) in rows {
                drive_case(&crm, &source, subject, description, priority, end, assign);
            }

            let first = crm.exchange().export_csv(source.tenant_id, ExchangeEntity::SupportCases).unwrap();
            let report = crm.exchange().import_csv(&target, ExchangeEntity::SupportCases, first.as_bytes()).unwrap();
            prop_assert!(report.failed.is_empty(), "{:?}", report.failed);
            let second = crm.exchange().export_csv(target.tenant_id, ExchangeEntity::SupportCases).unwrap();
            prop_assert_eq!(first, second);
        }
    }
}
