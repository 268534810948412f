//! Dictionary definitions.
//!
//! Dictionaries backed by a ClickHouse table are created by migrations. Dictionaries
//! backed by an external database need credentials, which must never be written into a
//! migration script; those are created at runtime through
//! [`create_external_dictionary_sql`] with credentials taken from a
//! [`CredentialResolver`].

use config::{Config, Environment};
use serde::Deserialize;

use crate::error::ClickguardError;
use crate::schema::engine::EntityEngineSpec;
use crate::sql_helper::SqlHelper;
use crate::types::{AppType, TypeConfig, TypeMapper, Value};

/// Reference to an external database, named by a credential profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalSourceRef {
    pub profile: String,
    pub database: Option<String>,
    pub table: Option<String>,
}

/// Where a dictionary loads its data from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DictionarySource {
    ClickHouse {
        table: String,
        database: Option<String>,
    },
    PostgreSql(ExternalSourceRef),
    MySql(ExternalSourceRef),
    Http {
        profile: String,
        format: String,
    },
}

impl DictionarySource {
    pub fn is_external(&self) -> bool {
        !matches!(self, DictionarySource::ClickHouse { .. })
    }

    fn kind_name(&self) -> &'static str {
        match self {
            DictionarySource::ClickHouse { .. } => "CLICKHOUSE",
            DictionarySource::PostgreSql(_) => "POSTGRESQL",
            DictionarySource::MySql(_) => "MYSQL",
            DictionarySource::Http { .. } => "HTTP",
        }
    }
}

/// In-memory layout of a dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DictionaryLayout {
    Flat,
    Hashed,
    SparseHashed,
    ComplexKeyHashed,
    ComplexKeySparseHashed,
    Cache { size_in_cells: u64 },
    ComplexKeyCache { size_in_cells: u64 },
    Direct,
    ComplexKeyDirect,
}

impl DictionaryLayout {
    /// Layouts keyed by a composite or non-integer key.
    pub fn is_complex_key(&self) -> bool {
        matches!(
            self,
            DictionaryLayout::ComplexKeyHashed
                | DictionaryLayout::ComplexKeySparseHashed
                | DictionaryLayout::ComplexKeyCache { .. }
                | DictionaryLayout::ComplexKeyDirect
        )
    }

    pub fn render(&self) -> String {
        let body = match self {
            DictionaryLayout::Flat => "FLAT()".to_string(),
            DictionaryLayout::Hashed => "HASHED()".to_string(),
            DictionaryLayout::SparseHashed => "SPARSE_HASHED()".to_string(),
            DictionaryLayout::ComplexKeyHashed => "COMPLEX_KEY_HASHED()".to_string(),
            DictionaryLayout::ComplexKeySparseHashed => "COMPLEX_KEY_SPARSE_HASHED()".to_string(),
            DictionaryLayout::Cache { size_in_cells } => format!("CACHE(SIZE_IN_CELLS {size_in_cells})"),
            DictionaryLayout::ComplexKeyCache { size_in_cells } => {
                format!("COMPLEX_KEY_CACHE(SIZE_IN_CELLS {size_in_cells})")
            }
            DictionaryLayout::Direct => "DIRECT()".to_string(),
            DictionaryLayout::ComplexKeyDirect => "COMPLEX_KEY_DIRECT()".to_string(),
        };
        format!("LAYOUT({body})")
    }
}

/// Refresh interval in seconds. `min == max == 0` disables reloading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DictionaryLifetime {
    pub min: u64,
    pub max: u64,
}

impl Default for DictionaryLifetime {
    fn default() -> Self {
        Self { min: 300, max: 360 }
    }
}

impl DictionaryLifetime {
    pub fn render(&self) -> String {
        if self.min == 0 && self.max == 0 {
            "LIFETIME(0)".to_string()
        } else {
            format!("LIFETIME(MIN {} MAX {})", self.min, self.max)
        }
    }
}

/// A key or attribute column of a dictionary.
#[derive(Debug, Clone, PartialEq)]
pub struct DictionaryAttribute {
    pub name: String,
    pub app_type: AppType,
    /// Value returned for missing keys. Ignored on key columns.
    pub default: Option<Value>,
    pub expression: Option<String>,
    pub hierarchical: bool,
    pub injective: bool,
}

impl DictionaryAttribute {
    pub fn new(name: impl Into<String>, app_type: AppType) -> Self {
        Self {
            name: name.into(),
            app_type,
            default: None,
            expression: None,
            hierarchical: false,
            injective: false,
        }
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn expression(mut self, expr: impl Into<String>) -> Self {
        self.expression = Some(expr.into());
        self
    }

    pub fn hierarchical(mut self) -> Self {
        self.hierarchical = true;
        self
    }

    pub fn injective(mut self) -> Self {
        self.injective = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DictionaryDefinition {
    pub keys: Vec<DictionaryAttribute>,
    pub attributes: Vec<DictionaryAttribute>,
    pub source: DictionarySource,
    pub layout: DictionaryLayout,
    pub lifetime: DictionaryLifetime,
    /// Custom source query replacing the source table.
    pub query: Option<String>,
}

impl DictionaryDefinition {
    pub fn new(source: DictionarySource, layout: DictionaryLayout) -> Self {
        Self {
            keys: Vec::new(),
            attributes: Vec::new(),
            source,
            layout,
            lifetime: DictionaryLifetime::default(),
            query: None,
        }
    }

    pub fn key(mut self, key: DictionaryAttribute) -> Self {
        self.keys.push(key);
        self
    }

    pub fn attribute(mut self, attribute: DictionaryAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn lifetime(mut self, min: u64, max: u64) -> Self {
        self.lifetime = DictionaryLifetime { min, max };
        self
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn is_external(&self) -> bool {
        self.source.is_external()
    }

    /// Check key/layout compatibility, lifetime bounds and source completeness.
    pub fn validate(&self, name: &str) -> Result<(), ClickguardError> {
        let setting = |what: &str| format!("dictionary {name} {what}");

        if self.keys.is_empty() {
            return Err(ClickguardError::invalid_config(setting("keys"), "none", "at least one key column"));
        }
        if self.attributes.is_empty() {
            return Err(ClickguardError::invalid_config(
                setting("attributes"),
                "none",
                "at least one attribute column",
            ));
        }

        let simple_key = self.keys.len() == 1 && self.keys[0].app_type == AppType::UInt64;
        if !self.layout.is_complex_key() && !simple_key {
            return Err(ClickguardError::invalid_config(
                setting("layout"),
                self.layout.render(),
                "a COMPLEX_KEY_* layout for composite or non-UInt64 keys",
            ));
        }

        if let DictionaryLayout::Cache { size_in_cells: 0 } | DictionaryLayout::ComplexKeyCache { size_in_cells: 0 } =
            self.layout
        {
            return Err(ClickguardError::invalid_config(setting("cache size"), 0, "a positive cell count"));
        }

        if self.lifetime.min > self.lifetime.max {
            return Err(ClickguardError::invalid_config(
                setting("lifetime"),
                format!("MIN {} MAX {}", self.lifetime.min, self.lifetime.max),
                "MIN not greater than MAX",
            ));
        }

        match &self.source {
            DictionarySource::ClickHouse { table, .. } if table.is_empty() && self.query.is_none() => {
                Err(ClickguardError::invalid_config(setting("source"), "''", "a source table or query"))
            }
            DictionarySource::PostgreSql(ext) | DictionarySource::MySql(ext) => {
                if ext.profile.is_empty() {
                    Err(ClickguardError::invalid_config(setting("source profile"), "''", "a credential profile"))
                } else if ext.table.is_none() && self.query.is_none() {
                    Err(ClickguardError::invalid_config(setting("source"), "none", "a source table or query"))
                } else {
                    Ok(())
                }
            }
            DictionarySource::Http { profile, format } if profile.is_empty() || format.is_empty() => Err(
                ClickguardError::invalid_config(setting("source"), "HTTP", "a credential profile and a format"),
            ),
            _ => Ok(()),
        }
    }

    /// `SOURCE(CLICKHOUSE(...))` for ClickHouse-backed dictionaries.
    ///
    /// External sources have no credential-free rendering; they return an
    /// unsupported-operation error pointing at the runtime path.
    pub fn clickhouse_source_clause(&self, helper: &SqlHelper) -> Result<String, ClickguardError> {
        match &self.source {
            DictionarySource::ClickHouse { table, database } => {
                let mut parts = Vec::new();
                if let Some(db) = database {
                    parts.push(format!("DB {}", helper.string_literal(db)));
                }
                match &self.query {
                    Some(query) => parts.push(format!("QUERY {}", helper.string_literal(query))),
                    None => parts.push(format!("TABLE {}", helper.string_literal(table))),
                }
                Ok(format!("SOURCE(CLICKHOUSE({}))", parts.join(" ")))
            }
            other => Err(ClickguardError::invalid_config(
                "dictionary source",
                other.kind_name(),
                "a CLICKHOUSE source; external sources are created at runtime",
            )),
        }
    }

    /// Source clause for an external dictionary with resolved credentials.
    pub fn external_source_clause(
        &self,
        credentials: &ResolvedCredentials,
        helper: &SqlHelper,
    ) -> Result<String, ClickguardError> {
        let lit = |v: &str| helper.string_literal(v);
        match &self.source {
            DictionarySource::PostgreSql(ext) | DictionarySource::MySql(ext) => {
                let host = credentials.host.as_deref().ok_or_else(|| {
                    ClickguardError::invalid_config(
                        format!("credential profile {} host", ext.profile),
                        "none",
                        "a host name",
                    )
                })?;
                let mut parts = vec![format!("HOST {}", lit(host))];
                if let Some(port) = credentials.port {
                    parts.push(format!("PORT {port}"));
                }
                if let Some(user) = &credentials.user {
                    parts.push(format!("USER {}", lit(user)));
                }
                if let Some(password) = &credentials.password {
                    parts.push(format!("PASSWORD {}", lit(password)));
                }
                if let Some(db) = ext.database.as_ref().or(credentials.database.as_ref()) {
                    parts.push(format!("DB {}", lit(db)));
                }
                match (&self.query, &ext.table) {
                    (Some(query), _) => parts.push(format!("QUERY {}", lit(query))),
                    (None, Some(table)) => parts.push(format!("TABLE {}", lit(table))),
                    (None, None) => {}
                }
                Ok(format!("SOURCE({}({}))", self.source.kind_name(), parts.join(" ")))
            }
            DictionarySource::Http { profile, format } => {
                let url = credentials.url.as_deref().ok_or_else(|| {
                    ClickguardError::invalid_config(format!("credential profile {profile} url"), "none", "a URL")
                })?;
                let mut parts = vec![format!("URL {}", lit(url)), format!("FORMAT {}", lit(format))];
                if let (Some(user), Some(password)) = (&credentials.user, &credentials.password) {
                    parts.push(format!("CREDENTIALS(USER {} PASSWORD {})", lit(user), lit(password)));
                }
                Ok(format!("SOURCE(HTTP({}))", parts.join(" ")))
            }
            DictionarySource::ClickHouse { .. } => self.clickhouse_source_clause(helper),
        }
    }

    /// Full `CREATE DICTIONARY` statement with the given source clause, unterminated.
    pub fn create_statement(
        &self,
        qualified_name: &str,
        source_clause: &str,
        mapper: &TypeMapper,
        helper: &SqlHelper,
    ) -> Result<String, ClickguardError> {
        let mut columns = Vec::with_capacity(self.keys.len() + self.attributes.len());
        for key in &self.keys {
            columns.push(self.render_attribute(key, true, mapper, helper)?);
        }
        for attribute in &self.attributes {
            columns.push(self.render_attribute(attribute, false, mapper, helper)?);
        }
        let key_names = self.keys.iter().map(|k| k.name.clone()).collect::<Vec<_>>();

        Ok(format!(
            "CREATE DICTIONARY IF NOT EXISTS {}\n(\n    {}\n)\nPRIMARY KEY {}\n{}\n{}\n{}",
            qualified_name,
            columns.join(",\n    "),
            helper.delimit_column_list(&key_names),
            source_clause,
            self.lifetime.render(),
            self.layout.render()
        ))
    }

    fn render_attribute(
        &self,
        attribute: &DictionaryAttribute,
        is_key: bool,
        mapper: &TypeMapper,
        helper: &SqlHelper,
    ) -> Result<String, ClickguardError> {
        let mut line = format!(
            "{} {}",
            helper.delimit_identifier(&attribute.name, None),
            mapper.resolve(&attribute.app_type, &TypeConfig::default())?
        );
        if is_key {
            return Ok(line);
        }
        if let Some(default) = &attribute.default {
            line.push_str(&format!(" DEFAULT {}", default.to_sql_literal(helper)));
        }
        if let Some(expr) = &attribute.expression {
            line.push_str(&format!(" EXPRESSION {expr}"));
        }
        if attribute.hierarchical {
            line.push_str(" HIERARCHICAL");
        }
        if attribute.injective {
            line.push_str(" INJECTIVE");
        }
        Ok(line)
    }
}

/// Credentials for one profile. Absent parts are simply omitted from the source clause.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ResolvedCredentials {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub url: Option<String>,
}

impl std::fmt::Debug for ResolvedCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedCredentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .field("url", &self.url)
            .finish()
    }
}

/// Looks up connection credentials for a named profile.
pub trait CredentialResolver {
    fn resolve(&self, profile: &str) -> Result<ResolvedCredentials, ClickguardError>;
}

/// Reads `<PROFILE>_HOST`, `<PROFILE>_PORT`, `<PROFILE>_USER`, `<PROFILE>_PASSWORD`,
/// `<PROFILE>_DATABASE` and `<PROFILE>_URL` through a prefixed `config` environment source.
///
/// The profile name is upper-cased and every non-alphanumeric character becomes `_`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentialResolver;

impl EnvCredentialResolver {
    pub fn variable_prefix(profile: &str) -> String {
        profile
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect()
    }
}

impl CredentialResolver for EnvCredentialResolver {
    fn resolve(&self, profile: &str) -> Result<ResolvedCredentials, ClickguardError> {
        let prefix = Self::variable_prefix(profile);
        let credentials = Config::builder()
            .add_source(Environment::with_prefix(&prefix))
            .build()
            .and_then(|settings| settings.try_deserialize::<ResolvedCredentials>())
            .map_err(|err| {
                ClickguardError::invalid_config(
                    format!("credential profile {profile}"),
                    err,
                    format!("well-formed {prefix}_* variables with {prefix}_PORT a TCP port number"),
                )
            })?;
        if credentials.host.is_none() && credentials.url.is_none() {
            return Err(ClickguardError::invalid_config(
                format!("credential profile {profile}"),
                "no host or url",
                format!("{prefix}_HOST or {prefix}_URL to be set"),
            ));
        }
        Ok(credentials)
    }
}

/// Build the `CREATE DICTIONARY` statement for an externally sourced dictionary.
///
/// Intended to run at application startup; the returned SQL contains credentials and
/// must not be persisted.
pub fn create_external_dictionary_sql(
    entity: &EntityEngineSpec,
    definition: &DictionaryDefinition,
    resolver: &dyn CredentialResolver,
    mapper: &TypeMapper,
    helper: &SqlHelper,
) -> Result<String, ClickguardError> {
    definition.validate(&entity.table)?;
    let profile = match &definition.source {
        DictionarySource::PostgreSql(ext) | DictionarySource::MySql(ext) => ext.profile.as_str(),
        DictionarySource::Http { profile, .. } => profile.as_str(),
        DictionarySource::ClickHouse { .. } => {
            return Err(ClickguardError::invalid_config(
                format!("dictionary {} source", entity.table),
                "CLICKHOUSE",
                "an external source; ClickHouse-backed dictionaries are created by migrations",
            ))
        }
    };
    let credentials = resolver.resolve(profile)?;
    let source = definition.external_source_clause(&credentials, helper)?;
    let name = helper.delimit_identifier(&entity.table, entity.schema.as_deref());
    let statement = definition.create_statement(&name, &source, mapper, helper)?;
    log::debug!("Prepared external dictionary {} from profile {}", entity.table, profile);
    Ok(helper.terminate(&statement))
}
