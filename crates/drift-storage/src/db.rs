use color_eyre::Result;

pub struct Db {
	pub pool: sqlx::PgPool,
}

impl Db {
	pub async fn connect(cfg: &drift_config::Postgres) -> Result<Self> {
		let pool = sqlx::postgres::PgPoolOptions::new()
			.max_connections(cfg.pool_max_conns)
			.connect(&cfg.dsn)
			.await?;
		Ok(Self { pool })
	}

	/// Build the pool without touching the network. Queries fail until the
	/// database is reachable; used by tests that never issue one.
	pub fn connect_lazy(cfg: &drift_config::Postgres) -> Result<Self> {
		let pool = sqlx::postgres::PgPoolOptions::new()
			.max_connections(cfg.pool_max_conns)
			.connect_lazy(&cfg.dsn)?;
		Ok(Self { pool })
	}

	pub async fn ensure_schema(&self) -> Result<()> {
		let sql = crate::schema::SCHEMA;
		let lock_id: i64 = 44_726_602;
		sqlx::query("SELECT pg_advisory_lock($1)").bind(lock_id).execute(&self.pool).await?;

		let mut failure: Option<color_eyre::Report> = None;
		for statement in sql.split(';') {
			let trimmed = statement.trim();
			if trimmed.is_empty() {
				continue;
			}
			if let Err(err) = sqlx::query(trimmed).execute(&self.pool).await {
				failure = Some(err.into());
				break;
			}
		}
		let _ =
			sqlx::query("SELECT pg_advisory_unlock($1)").bind(lock_id).execute(&self.pool).await;
		if let Some(err) = failure {
			return Err(err);
		}
		Ok(())
	}
}
