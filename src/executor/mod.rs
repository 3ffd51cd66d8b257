// ABOUTME: Applies replication profiles to their databases
// ABOUTME: Idempotent create, tolerant drop, and batch runs that survive failures

pub mod report;

pub use report::{Action, BatchReport, ObjectKind, ObjectReport, Outcome, ProfileReport};

use anyhow::{anyhow, Result};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use tracing::{error, info, warn};

use crate::config::{Config, PublicationScope, ReplicationProfile};
use crate::postgres::Connector;
use crate::replication::{ddl, PublicationInfo, ReplicationCatalog, SlotInfo};
use crate::utils;

/// Creates the publication and then the slot of `profile`.
///
/// The slot is only attempted once the publication is in place, so a failed
/// publication never leaves a slot holding WAL behind.
pub async fn create_objects<C>(catalog: &C, profile: &ReplicationProfile) -> Vec<ObjectReport>
where
    C: ReplicationCatalog + ?Sized,
{
    let publication = ensure_publication(catalog, profile).await;
    let publication_ok = publication.is_ok();
    let mut objects = vec![ObjectReport::new(
        ObjectKind::Publication,
        &profile.publication_name,
        publication,
    )];

    let slot = if publication_ok {
        ensure_slot(catalog, profile).await
    } else {
        Err(anyhow!("skipped because the publication could not be created"))
    };
    objects.push(ObjectReport::new(ObjectKind::Slot, &profile.slot_name, slot));
    objects
}

/// Drops the slot and then the publication of `profile`. Both drops are
/// attempted; objects that are already gone count as success.
pub async fn drop_objects<C>(catalog: &C, profile: &ReplicationProfile) -> Vec<ObjectReport>
where
    C: ReplicationCatalog + ?Sized,
{
    let slot = catalog.drop_slot(&profile.slot_name).await.map(|dropped| {
        if dropped {
            info!("Dropped replication slot {}", profile.slot_name);
            Outcome::Dropped
        } else {
            info!(
                "Replication slot {} does not exist, nothing to drop",
                profile.slot_name
            );
            Outcome::Absent
        }
    });

    let publication = catalog
        .drop_publication(&profile.publication_name)
        .await
        .map(|dropped| {
            if dropped {
                info!("Dropped publication {}", profile.publication_name);
                Outcome::Dropped
            } else {
                info!(
                    "Publication {} does not exist, nothing to drop",
                    profile.publication_name
                );
                Outcome::Absent
            }
        });

    vec![
        ObjectReport::new(ObjectKind::Slot, &profile.slot_name, slot),
        ObjectReport::new(ObjectKind::Publication, &profile.publication_name, publication),
    ]
}

async fn ensure_publication<C>(catalog: &C, profile: &ReplicationProfile) -> Result<Outcome>
where
    C: ReplicationCatalog + ?Sized,
{
    let Some(existing) = catalog.publication(&profile.publication_name).await? else {
        return Ok(if catalog.create_publication(profile).await? {
            Outcome::Created
        } else {
            // created by someone else since we looked
            Outcome::AlreadyExists
        });
    };

    info!("Publication {} already exists", profile.publication_name);
    warn_on_publication_drift(profile, &existing);

    let mut added = Vec::new();
    for table in existing.missing_tables(profile.tables()) {
        if catalog
            .add_publication_table(&profile.publication_name, table)
            .await?
        {
            info!("Added {} to publication {}", table, profile.publication_name);
            added.push(table.to_string());
        }
    }

    Ok(if added.is_empty() {
        Outcome::AlreadyExists
    } else {
        Outcome::Extended { added }
    })
}

fn warn_on_publication_drift(profile: &ReplicationProfile, existing: &PublicationInfo) {
    for drift in publication_drift(profile, existing) {
        warn!("{}; leaving it unchanged", drift);
    }
}

/// Ways an existing publication differs from what `profile` would create.
fn publication_drift(profile: &ReplicationProfile, existing: &PublicationInfo) -> Vec<String> {
    let mut drift = Vec::new();

    if existing.operations != profile.operations {
        let actual: Vec<String> = existing.operations.iter().map(|o| o.to_string()).collect();
        drift.push(format!(
            "Publication {} publishes '{}' but profile {} asks for '{}'",
            profile.publication_name,
            actual.join(", "),
            profile.name,
            profile.publish_param()
        ));
    }

    let wants_all = matches!(profile.scope, PublicationScope::AllTables);
    if existing.all_tables != wants_all {
        drift.push(format!(
            "Publication {} {} FOR ALL TABLES but profile {} is '{}'",
            profile.publication_name,
            if existing.all_tables { "is" } else { "is not" },
            profile.name,
            profile.scope.kind()
        ));
        return drift;
    }

    let unexpected = match &profile.scope {
        PublicationScope::AllTables => Vec::new(),
        PublicationScope::Schema(schema) => existing.tables_outside_schema(schema),
        PublicationScope::Tables(tables) => existing.extra_tables(tables),
    };
    if !unexpected.is_empty() {
        drift.push(format!(
            "Publication {} also publishes {} which profile {} does not cover",
            profile.publication_name,
            unexpected.join(", "),
            profile.name
        ));
    }
    drift
}

async fn ensure_slot<C>(catalog: &C, profile: &ReplicationProfile) -> Result<Outcome>
where
    C: ReplicationCatalog + ?Sized,
{
    if let Some(existing) = catalog.slot(&profile.slot_name).await? {
        info!("Replication slot {} already exists", profile.slot_name);
        warn_on_slot_drift(&existing);
        return Ok(Outcome::AlreadyExists);
    }

    Ok(match catalog.create_slot(&profile.slot_name).await? {
        Some(_) => Outcome::Created,
        None => Outcome::AlreadyExists,
    })
}

fn warn_on_slot_drift(existing: &SlotInfo) {
    if let Some(drift) = slot_drift(existing) {
        warn!("{}", drift);
    }
}

fn slot_drift(existing: &SlotInfo) -> Option<String> {
    if !existing.is_logical() {
        Some(format!(
            "Replication slot {} is a {} slot, not a logical one",
            existing.name, existing.slot_type
        ))
    } else if existing.plugin.as_deref() != Some(ddl::OUTPUT_PLUGIN) {
        Some(format!(
            "Replication slot {} uses plugin {} instead of {}",
            existing.name,
            existing.plugin.as_deref().unwrap_or("<none>"),
            ddl::OUTPUT_PLUGIN
        ))
    } else {
        None
    }
}

/// Live state of one profile's objects.
#[derive(Debug, Clone)]
pub struct ProfileStatus {
    pub profile: String,
    pub publication_name: String,
    pub slot_name: String,
    pub publication: Option<PublicationInfo>,
    pub slot: Option<SlotInfo>,
}

impl fmt::Display for ProfileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.profile)?;
        match &self.publication {
            Some(p) => {
                let ops: Vec<String> = p.operations.iter().map(|o| o.to_string()).collect();
                let tables = if p.all_tables {
                    "ALL TABLES".to_string()
                } else {
                    p.tables.join(", ")
                };
                writeln!(
                    f,
                    "  publication {}: publish = '{}', tables = [{}]",
                    self.publication_name,
                    ops.join(", "),
                    tables
                )?;
            }
            None => writeln!(f, "  publication {}: missing", self.publication_name)?,
        }
        match &self.slot {
            Some(s) => writeln!(
                f,
                "  replication slot {}: {} ({}), {}",
                self.slot_name,
                s.slot_type,
                s.plugin.as_deref().unwrap_or("no plugin"),
                if s.active { "active" } else { "inactive" }
            ),
            None => writeln!(f, "  replication slot {}: missing", self.slot_name),
        }
    }
}

/// Runs profiles from one config, holding at most one connection per
/// connection profile for the life of the executor.
pub struct ProfileExecutor<'a, K: Connector> {
    config: &'a Config,
    connector: K,
    catalogs: HashMap<String, K::Catalog>,
}

impl<'a, K: Connector> ProfileExecutor<'a, K> {
    pub fn new(config: &'a Config, connector: K) -> Self {
        Self {
            config,
            connector,
            catalogs: HashMap::new(),
        }
    }

    pub fn profile(&self, name: &str) -> Result<&'a ReplicationProfile> {
        self.config
            .replication_profile(name)
            .ok_or_else(|| anyhow!("Replication profile '{}' not found in config", name))
    }

    async fn catalog(&mut self, name: &str) -> Result<&K::Catalog> {
        let connection = self
            .config
            .connection(name)
            .ok_or_else(|| anyhow!("Connection profile '{}' not found in config", name))?;

        match self.catalogs.entry(name.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let catalog = self.connector.connect(connection).await?;
                Ok(entry.insert(catalog))
            }
        }
    }

    async fn run(&mut self, profile: &ReplicationProfile, action: Action) -> ProfileReport {
        let mut report = ProfileReport {
            profile: profile.name.clone(),
            action,
            objects: Vec::new(),
            failure: None,
        };

        match self.catalog(&profile.connection).await {
            Ok(catalog) => {
                report.objects = match action {
                    Action::Create => create_objects(catalog, profile).await,
                    Action::Drop => drop_objects(catalog, profile).await,
                };
            }
            Err(e) => report.failure = Some(format!("{:#}", e)),
        }

        if report.is_success() {
            info!("Processed replication profile {}", profile.name);
        } else {
            error!("Replication profile {} failed", profile.name);
        }
        report
    }

    pub async fn create_profile(&mut self, name: &str) -> Result<ProfileReport> {
        let profile = self.profile(name)?;
        info!(
            "Creating publication {} and replication slot {} for profile {}",
            profile.publication_name, profile.slot_name, profile.name
        );
        Ok(self.run(profile, Action::Create).await)
    }

    pub async fn drop_profile(&mut self, name: &str) -> Result<ProfileReport> {
        let profile = self.profile(name)?;
        info!(
            "Dropping replication slot {} and publication {} for profile {}",
            profile.slot_name, profile.publication_name, profile.name
        );
        Ok(self.run(profile, Action::Drop).await)
    }

    pub async fn create_all(&mut self) -> BatchReport {
        self.run_all(Action::Create).await
    }

    pub async fn drop_all(&mut self) -> BatchReport {
        self.run_all(Action::Drop).await
    }

    async fn run_all(&mut self, action: Action) -> BatchReport {
        let config = self.config;
        let mut batch = BatchReport::default();
        for profile in config.replication_profiles() {
            batch.profiles.push(self.run(profile, action).await);
        }
        batch
    }

    pub async fn status(&mut self, profile: &ReplicationProfile) -> Result<ProfileStatus> {
        let catalog = self.catalog(&profile.connection).await?;
        Ok(ProfileStatus {
            profile: profile.name.clone(),
            publication_name: profile.publication_name.clone(),
            slot_name: profile.slot_name.clone(),
            publication: catalog.publication(&profile.publication_name).await?,
            slot: catalog.slot(&profile.slot_name).await?,
        })
    }

    /// Grants `role` read access to the schemas replicated by one profile,
    /// or by every profile when `profile` is `None`. Returns the statements
    /// that were executed.
    pub async fn grant_privileges(&mut self, role: &str, profile: Option<&str>) -> Result<Vec<String>> {
        utils::validate_sql_identifier(role)?;

        let config = self.config;
        let mut targets: Vec<(String, Vec<String>)> = Vec::new();
        match profile {
            Some(name) => {
                let profile = self.profile(name)?;
                if matches!(profile.scope, PublicationScope::AllTables) {
                    anyhow::bail!(
                        "Profile '{}' publishes ALL TABLES; grant privileges per schema instead",
                        profile.name
                    );
                }
                targets.push((profile.connection.clone(), profile.schemas().into_iter().collect()));
            }
            None => {
                for connection in config.connections() {
                    let schemas = config.replication_schemas(Some(&connection.name));
                    if !schemas.is_empty() {
                        targets.push((connection.name.clone(), schemas.into_iter().collect()));
                    }
                }
            }
        }

        let mut executed = Vec::new();
        for (connection, schemas) in targets {
            let catalog = self.catalog(&connection).await?;
            for schema in &schemas {
                for statement in ddl::grant_schema_privileges(schema, role) {
                    catalog.execute(&statement).await?;
                    executed.push(statement);
                }
            }
            info!(
                "Granted replication privileges to {} on schemas {} via {}",
                role,
                schemas.join(", "),
                connection
            );
        }
        Ok(executed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectionProfile, Operation};
    use crate::replication::CreatedSlot;
    use async_trait::async_trait;
    use std::collections::{BTreeSet, HashSet};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct State {
        publications: HashMap<String, PublicationInfo>,
        slots: HashMap<String, SlotInfo>,
        statements: Vec<String>,
        fail_publications: bool,
        fail_slot_drops: bool,
        hide_existing: bool,
    }

    /// In-memory stand-in for a database's publication and slot catalogs.
    #[derive(Clone, Default)]
    struct FakeCatalog(Arc<Mutex<State>>);

    impl FakeCatalog {
        fn state(&self) -> std::sync::MutexGuard<'_, State> {
            self.0.lock().unwrap()
        }
    }

    #[async_trait]
    impl ReplicationCatalog for FakeCatalog {
        async fn publication(&self, name: &str) -> Result<Option<PublicationInfo>> {
            let state = self.state();
            if state.hide_existing {
                return Ok(None);
            }
            Ok(state.publications.get(name).cloned())
        }

        async fn create_publication(&self, profile: &ReplicationProfile) -> Result<bool> {
            let mut state = self.state();
            if state.fail_publications {
                anyhow::bail!("permission denied for database bookies");
            }
            if state.publications.contains_key(&profile.publication_name) {
                return Ok(false);
            }
            state.statements.push(ddl::create_publication(profile));
            let mut tables: Vec<String> = profile
                .tables()
                .iter()
                .map(|t| utils::normalize_table_name(t))
                .collect();
            tables.sort();
            state.publications.insert(
                profile.publication_name.clone(),
                PublicationInfo {
                    name: profile.publication_name.clone(),
                    all_tables: matches!(profile.scope, PublicationScope::AllTables),
                    operations: profile.operations.clone(),
                    truncate: false,
                    tables,
                },
            );
            Ok(true)
        }

        async fn add_publication_table(&self, publication: &str, table: &str) -> Result<bool> {
            let mut state = self.state();
            state
                .statements
                .push(ddl::add_publication_table(publication, table));
            let publication = state
                .publications
                .get_mut(publication)
                .ok_or_else(|| anyhow!("publication {} does not exist", publication))?;
            let table = utils::normalize_table_name(table);
            if publication.tables.contains(&table) {
                return Ok(false);
            }
            publication.tables.push(table);
            Ok(true)
        }

        async fn drop_publication(&self, name: &str) -> Result<bool> {
            let mut state = self.state();
            state.statements.push(ddl::drop_publication(name));
            Ok(state.publications.remove(name).is_some())
        }

        async fn slot(&self, name: &str) -> Result<Option<SlotInfo>> {
            let state = self.state();
            if state.hide_existing {
                return Ok(None);
            }
            Ok(state.slots.get(name).cloned())
        }

        async fn create_slot(&self, name: &str) -> Result<Option<CreatedSlot>> {
            let mut state = self.state();
            if state.slots.contains_key(name) {
                return Ok(None);
            }
            state.statements.push(ddl::create_slot_literal(name));
            state.slots.insert(
                name.to_string(),
                SlotInfo {
                    name: name.to_string(),
                    plugin: Some(ddl::OUTPUT_PLUGIN.to_string()),
                    slot_type: "logical".to_string(),
                    active: false,
                    database: Some("bookies".to_string()),
                },
            );
            Ok(Some(CreatedSlot {
                name: name.to_string(),
                consistent_point: "0/16B6C50".to_string(),
            }))
        }

        async fn drop_slot(&self, name: &str) -> Result<bool> {
            let mut state = self.state();
            if state.fail_slot_drops {
                anyhow::bail!("replication slot \"{}\" is active for PID 4242", name);
            }
            state.statements.push(ddl::DROP_SLOT.replace("$1", &format!("'{}'", name)));
            Ok(state.slots.remove(name).is_some())
        }

        async fn execute(&self, statement: &str) -> Result<()> {
            self.state().statements.push(statement.to_string());
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct FakeConnector {
        catalogs: HashMap<String, FakeCatalog>,
        unreachable: HashSet<String>,
        connects: Arc<Mutex<usize>>,
    }

    impl FakeConnector {
        fn catalog(&self, connection: &str) -> FakeCatalog {
            self.catalogs.get(connection).cloned().unwrap()
        }
    }

    #[async_trait]
    impl Connector for FakeConnector {
        type Catalog = FakeCatalog;

        async fn connect(&self, connection: &ConnectionProfile) -> Result<FakeCatalog> {
            *self.connects.lock().unwrap() += 1;
            if self.unreachable.contains(&connection.name) {
                anyhow::bail!("could not connect to server: Connection refused");
            }
            Ok(self
                .catalogs
                .get(&connection.name)
                .cloned()
                .unwrap_or_default())
        }
    }

    const CONFIG: &str = r#"
CONNECTION_PROFILES:
  - name: bookies_db
    type: ENV_SECRETS
    credential_id: BOOKIES_DB_URL
  - name: ledger_db
    type: ENV_SECRETS
    credential_id: LEDGER_DB_URL
REPLICATION_PROFILES:
  - replication_profile_name: bookies_cdc
    connection_profile: bookies_db
    publication_name: bookies_pub
    slot_name: bookies_slot
    publication_ops: [INSERT, UPDATE, DELETE]
    publication_type: filtered
    publication_tables: [bookies.bets, bookies.transactions]
  - replication_profile_name: ledger_cdc
    connection_profile: ledger_db
    publication_name: ledger_pub
    slot_name: ledger_slot
    publication_ops: [INSERT]
    publication_type: schema
    publication_schema: ledger
  - replication_profile_name: audit_cdc
    connection_profile: bookies_db
    publication_name: audit_pub
    slot_name: audit_slot
    publication_ops: [INSERT]
    publication_type: all
"#;

    fn setup() -> (Config, FakeConnector) {
        let config = Config::from_yaml_str(CONFIG).unwrap();
        let connector = FakeConnector {
            catalogs: HashMap::from([
                ("bookies_db".to_string(), FakeCatalog::default()),
                ("ledger_db".to_string(), FakeCatalog::default()),
            ]),
            ..Default::default()
        };
        (config, connector)
    }

    fn outcome(report: &ProfileReport, kind: ObjectKind) -> Outcome {
        report.object(kind).unwrap().result.clone().unwrap()
    }

    #[tokio::test]
    async fn test_create_filtered_profile() {
        let (config, connector) = setup();
        let mut executor = ProfileExecutor::new(&config, connector.clone());

        let report = executor.create_profile("bookies_cdc").await.unwrap();
        assert!(report.is_success());
        assert_eq!(outcome(&report, ObjectKind::Publication), Outcome::Created);
        assert_eq!(outcome(&report, ObjectKind::Slot), Outcome::Created);

        let db = connector.catalog("bookies_db");
        let state = db.state();
        let publication = &state.publications["bookies_pub"];
        assert_eq!(
            publication.operations,
            BTreeSet::from([Operation::Insert, Operation::Update, Operation::Delete])
        );
        assert_eq!(
            publication.tables,
            vec!["bookies.bets".to_string(), "bookies.transactions".to_string()]
        );
        assert!(!publication.all_tables);
        assert_eq!(
            state.statements[0],
            "CREATE PUBLICATION bookies_pub FOR TABLE bookies.bets, bookies.transactions \
             WITH (publish = 'insert, update, delete')"
        );
        assert_eq!(state.slots["bookies_slot"].plugin.as_deref(), Some("pgoutput"));
    }

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let (config, connector) = setup();
        let mut executor = ProfileExecutor::new(&config, connector.clone());

        executor.create_profile("bookies_cdc").await.unwrap();
        let statements_after_first = connector.catalog("bookies_db").state().statements.len();

        let report = executor.create_profile("bookies_cdc").await.unwrap();
        assert!(report.is_success());
        assert_eq!(outcome(&report, ObjectKind::Publication), Outcome::AlreadyExists);
        assert_eq!(outcome(&report, ObjectKind::Slot), Outcome::AlreadyExists);
        assert_eq!(
            connector.catalog("bookies_db").state().statements.len(),
            statements_after_first
        );
    }

    #[tokio::test]
    async fn test_create_race_counts_as_existing() {
        let (config, connector) = setup();
        let mut executor = ProfileExecutor::new(&config, connector.clone());
        executor.create_profile("bookies_cdc").await.unwrap();

        // Lookups miss, as if another session created the objects in between.
        connector.catalog("bookies_db").state().hide_existing = true;
        let report = executor.create_profile("bookies_cdc").await.unwrap();
        assert!(report.is_success());
        assert_eq!(outcome(&report, ObjectKind::Publication), Outcome::AlreadyExists);
        assert_eq!(outcome(&report, ObjectKind::Slot), Outcome::AlreadyExists);
    }

    #[tokio::test]
    async fn test_existing_publication_gains_missing_tables() {
        let (config, connector) = setup();
        connector.catalog("bookies_db").state().publications.insert(
            "bookies_pub".to_string(),
            PublicationInfo {
                name: "bookies_pub".to_string(),
                all_tables: false,
                operations: BTreeSet::from([Operation::Insert, Operation::Update, Operation::Delete]),
                truncate: false,
                tables: vec!["bookies.bets".to_string()],
            },
        );
        let mut executor = ProfileExecutor::new(&config, connector.clone());

        let report = executor.create_profile("bookies_cdc").await.unwrap();
        assert_eq!(
            outcome(&report, ObjectKind::Publication),
            Outcome::Extended {
                added: vec!["bookies.transactions".to_string()]
            }
        );
        assert!(connector
            .catalog("bookies_db")
            .state()
            .statements
            .contains(&"ALTER PUBLICATION bookies_pub ADD TABLE bookies.transactions".to_string()));
    }

    #[tokio::test]
    async fn test_drop_missing_objects_succeeds() {
        let (config, connector) = setup();
        let mut executor = ProfileExecutor::new(&config, connector.clone());

        let report = executor.drop_profile("ledger_cdc").await.unwrap();
        assert!(report.is_success());
        assert_eq!(outcome(&report, ObjectKind::Slot), Outcome::Absent);
        assert_eq!(outcome(&report, ObjectKind::Publication), Outcome::Absent);
    }

    #[tokio::test]
    async fn test_create_then_drop() {
        let (config, connector) = setup();
        let mut executor = ProfileExecutor::new(&config, connector.clone());

        executor.create_profile("ledger_cdc").await.unwrap();
        let report = executor.drop_profile("ledger_cdc").await.unwrap();
        assert!(report.is_success());
        assert_eq!(report.objects[0].kind, ObjectKind::Slot);
        assert_eq!(outcome(&report, ObjectKind::Slot), Outcome::Dropped);
        assert_eq!(outcome(&report, ObjectKind::Publication), Outcome::Dropped);

        let db = connector.catalog("ledger_db");
        assert!(db.state().publications.is_empty());
        assert!(db.state().slots.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_profile_is_an_error() {
        let (config, connector) = setup();
        let mut executor = ProfileExecutor::new(&config, connector.clone());

        let err = executor.create_profile("nope").await.unwrap_err();
        assert!(err.to_string().contains("nope"));
        assert!(executor.drop_profile("nope").await.is_err());
    }

    #[tokio::test]
    async fn test_failed_publication_skips_slot() {
        let (config, connector) = setup();
        connector.catalog("bookies_db").state().fail_publications = true;
        let mut executor = ProfileExecutor::new(&config, connector.clone());

        let report = executor.create_profile("bookies_cdc").await.unwrap();
        assert!(!report.is_success());
        let slot = report.object(ObjectKind::Slot).unwrap();
        assert!(slot.result.as_ref().unwrap_err().contains("skipped"));
        assert!(connector.catalog("bookies_db").state().slots.is_empty());
    }

    #[tokio::test]
    async fn test_batch_continues_past_failed_connection() {
        let (config, mut connector) = setup();
        connector.unreachable.insert("ledger_db".to_string());
        let mut executor = ProfileExecutor::new(&config, connector.clone());

        let batch = executor.create_all().await;
        assert_eq!(batch.profiles.len(), 3);
        assert!(!batch.is_success());

        let failed: Vec<_> = batch.failed().map(|p| p.profile.as_str()).collect();
        assert_eq!(failed, vec!["ledger_cdc"]);
        assert!(batch.profiles[1]
            .failure
            .as_ref()
            .unwrap()
            .contains("Connection refused"));

        let db = connector.catalog("bookies_db");
        assert!(db.state().publications.contains_key("bookies_pub"));
        assert!(db.state().publications.contains_key("audit_pub"));
    }

    #[tokio::test]
    async fn test_connection_is_reused_per_connection_profile() {
        let (config, connector) = setup();
        let mut executor = ProfileExecutor::new(&config, connector.clone());

        let batch = executor.create_all().await;
        assert!(batch.is_success());
        assert_eq!(*connector.connects.lock().unwrap(), 2);

        let batch = executor.drop_all().await;
        assert!(batch.is_success());
        assert_eq!(*connector.connects.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_status() {
        let (config, connector) = setup();
        let mut executor = ProfileExecutor::new(&config, connector.clone());
        let profile = config.replication_profile("audit_cdc").unwrap();

        let status = executor.status(profile).await.unwrap();
        assert!(status.publication.is_none());
        assert!(status.to_string().contains("audit_pub: missing"));

        executor.create_profile("audit_cdc").await.unwrap();
        let status = executor.status(profile).await.unwrap();
        assert!(status.publication.unwrap().all_tables);
        assert!(status.slot.is_some());
    }

    #[tokio::test]
    async fn test_grant_privileges() {
        let (config, connector) = setup();
        let mut executor = ProfileExecutor::new(&config, connector.clone());

        let executed = executor
            .grant_privileges("cdc_reader", Some("bookies_cdc"))
            .await
            .unwrap();
        assert_eq!(executed.len(), 3);
        assert_eq!(executed[0], "GRANT USAGE ON SCHEMA bookies TO cdc_reader");

        let executed = executor.grant_privileges("cdc_reader", None).await.unwrap();
        assert_eq!(executed.len(), 6);
        assert!(connector
            .catalog("ledger_db")
            .state()
            .statements
            .contains(&"GRANT USAGE ON SCHEMA ledger TO cdc_reader".to_string()));

        assert!(executor
            .grant_privileges("cdc_reader", Some("audit_cdc"))
            .await
            .is_err());
        assert!(executor
            .grant_privileges("cdc reader; --", None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_failed_slot_drop_still_drops_publication() {
        let (config, connector) = setup();
        let mut executor = ProfileExecutor::new(&config, connector.clone());
        executor.create_profile("bookies_cdc").await.unwrap();
        connector.catalog("bookies_db").state().fail_slot_drops = true;

        let report = executor.drop_profile("bookies_cdc").await.unwrap();
        assert!(!report.is_success());
        let slot = report.object(ObjectKind::Slot).unwrap();
        assert!(slot.result.as_ref().unwrap_err().contains("is active"));
        assert_eq!(outcome(&report, ObjectKind::Publication), Outcome::Dropped);

        let db = connector.catalog("bookies_db");
        assert!(db.state().publications.is_empty());
        assert!(db.state().slots.contains_key("bookies_slot"));
    }

    fn existing_publication(all_tables: bool, tables: &[&str]) -> PublicationInfo {
        PublicationInfo {
            name: "bookies_pub".to_string(),
            all_tables,
            operations: BTreeSet::from([Operation::Insert, Operation::Update, Operation::Delete]),
            truncate: false,
            tables: tables.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn test_publication_drift() {
        let (config, _) = setup();
        let bookies = config.replication_profile("bookies_cdc").unwrap();
        let ledger = config.replication_profile("ledger_cdc").unwrap();

        let matching = existing_publication(false, &["bookies.bets", "bookies.transactions"]);
        assert!(publication_drift(bookies, &matching).is_empty());

        // a schema publication reused by a filtered profile
        let wider = existing_publication(
            false,
            &["bookies.bets", "bookies.payouts", "bookies.transactions"],
        );
        let drift = publication_drift(bookies, &wider);
        assert_eq!(drift.len(), 1);
        assert!(drift[0].contains("bookies.payouts"));

        let drift = publication_drift(ledger, &existing_publication(false, &["public.accounts"]));
        assert_eq!(drift.len(), 2);
        assert!(drift[0].contains("asks for 'insert'"));
        assert!(drift[1].contains("public.accounts"));

        let drift = publication_drift(bookies, &existing_publication(true, &[]));
        assert_eq!(drift.len(), 1);
        assert!(drift[0].contains("is FOR ALL TABLES"));
    }

    #[test]
    fn test_slot_drift() {
        let mut slot = SlotInfo {
            name: "bookies_slot".to_string(),
            plugin: Some(ddl::OUTPUT_PLUGIN.to_string()),
            slot_type: "logical".to_string(),
            active: false,
            database: Some("bookies".to_string()),
        };
        assert!(slot_drift(&slot).is_none());

        slot.plugin = Some("wal2json".to_string());
        assert!(slot_drift(&slot).unwrap().contains("wal2json"));

        slot.slot_type = "physical".to_string();
        slot.plugin = None;
        assert!(slot_drift(&slot).unwrap().contains("physical"));
    }
}
