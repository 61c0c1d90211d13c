pub mod models;
pub mod schema;

use chrono::Utc;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use kinpoints_shared::domain::RequestStatus;
use models::{
    CatalogItem, Dependent, Guardian, Household, NewCatalogItem, NewDependent, NewGuardian,
    NewHousehold, NewTask, NewXpRequest, Task, XpRequest,
};

/// Structured error type for all storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A Diesel ORM error (query failure, constraint violation, etc.)
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    /// Failed to acquire or build a connection from the pool.
    #[error("pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    /// A `spawn_blocking` task panicked or was cancelled.
    #[error("task error: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// A database migration failed to apply.
    #[error("migration error: {0}")]
    Migration(String),
}

/// Result of submitting an XP request for a task.
#[derive(Debug)]
pub enum SubmitOutcome {
    Created(XpRequest),
    /// A pending request for this (task, dependent) pair already exists.
    AlreadyPending,
    /// Task missing, in another household, or not assigned to this dependent.
    TaskNotFound,
}

/// Result of a guardian decision on a pending request.
#[derive(Debug)]
pub enum DecisionOutcome {
    /// Status flipped; for approvals the balance credit is included.
    Applied {
        dependent_uid: Option<String>,
        requested_xp: i32,
        new_balance: Option<i32>,
    },
    /// The request exists but already reached a terminal state.
    NotPending,
    NotFound,
}

#[derive(Clone)]
pub struct Store {
    pool: Pool<ConnectionManager<SqliteConnection>>,
}

impl Store {
    pub async fn connect_sqlite(path: &str) -> Result<Self, StorageError> {
        let url = path.to_string();
        let manager = ConnectionManager::<SqliteConnection>::new(url);
        let pool = Pool::builder().max_size(8).build(manager)?;

        // Run pending Diesel migrations on startup (auto-init empty DBs)
        {
            let pool_clone = pool.clone();
            tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
                const MIGRATIONS: EmbeddedMigrations = embed_migrations!();
                let mut conn = pool_clone.get()?;
                configure_sqlite_conn(&mut conn)?;
                conn.run_pending_migrations(MIGRATIONS)
                    .map_err(|e| StorageError::Migration(e.to_string()))?;
                Ok(())
            })
            .await??;
        }

        Ok(Store { pool })
    }

    // --- identity ---

    pub async fn get_guardian(&self, user: &str) -> Result<Option<Guardian>, StorageError> {
        use schema::guardians::dsl::*;
        let pool = self.pool.clone();
        let uid = user.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<Guardian>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(guardians
                .filter(user_id.eq(&uid))
                .first::<Guardian>(&mut conn)
                .optional()?)
        })
        .await?
    }

    pub async fn get_dependent(&self, user: &str) -> Result<Option<Dependent>, StorageError> {
        use schema::dependents::dsl::*;
        let pool = self.pool.clone();
        let uid = user.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<Dependent>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(dependents
                .filter(user_id.eq(&uid))
                .first::<Dependent>(&mut conn)
                .optional()?)
        })
        .await?
    }

    /// Lazily create the guardian record for a user. No-op if present.
    pub async fn ensure_guardian(&self, user: &str, name: &str) -> Result<(), StorageError> {
        use schema::guardians;
        let pool = self.pool.clone();
        let uid = user.to_string();
        let name = name.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let rec = NewGuardian {
                user_id: &uid,
                display_name: &name,
            };
            diesel::insert_into(guardians::table)
                .values(&rec)
                .on_conflict_do_nothing()
                .execute(&mut conn)?;
            Ok(())
        })
        .await?
    }

    /// Lazily create the dependent record for a user. No-op if present.
    pub async fn ensure_dependent(&self, user: &str, name: &str) -> Result<(), StorageError> {
        use schema::dependents;
        let pool = self.pool.clone();
        let uid = user.to_string();
        let name = name.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let rec = NewDependent {
                user_id: &uid,
                display_name: &name,
            };
            diesel::insert_into(dependents::table)
                .values(&rec)
                .on_conflict_do_nothing()
                .execute(&mut conn)?;
            Ok(())
        })
        .await?
    }

    // --- households ---

    pub async fn household_for_guardian(
        &self,
        user: &str,
    ) -> Result<Option<Household>, StorageError> {
        use schema::households::dsl::*;
        let pool = self.pool.clone();
        let uid = user.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<Household>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(households
                .filter(guardian_uid.eq(&uid))
                .first::<Household>(&mut conn)
                .optional()?)
        })
        .await?
    }

    pub async fn get_household(&self, hid: i32) -> Result<Option<Household>, StorageError> {
        use schema::households::dsl::*;
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Option<Household>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(households
                .filter(id.eq(hid))
                .first::<Household>(&mut conn)
                .optional()?)
        })
        .await?
    }

    /// Exact, case-sensitive join-code match.
    pub async fn find_household_by_code(
        &self,
        code: &str,
    ) -> Result<Option<Household>, StorageError> {
        use schema::households::dsl::*;
        let pool = self.pool.clone();
        let code = code.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<Household>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(households
                .filter(join_code.eq(&code))
                .first::<Household>(&mut conn)
                .optional()?)
        })
        .await?
    }

    /// Insert the household plus its placeholder catalog item so the shop
    /// is never empty, in one transaction.
    pub async fn create_household(
        &self,
        name: &str,
        code: &str,
        guardian: &str,
        partner_key: &str,
    ) -> Result<Household, StorageError> {
        use schema::{catalog_items, households};
        let pool = self.pool.clone();
        let name = name.to_string();
        let code = code.to_string();
        let guardian = guardian.to_string();
        let partner_key = partner_key.to_string();
        tokio::task::spawn_blocking(move || -> Result<Household, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| -> Result<Household, StorageError> {
                let rec = NewHousehold {
                    display_name: &name,
                    join_code: &code,
                    guardian_uid: &guardian,
                    partner_api_key: &partner_key,
                };
                let household: Household = diesel::insert_into(households::table)
                    .values(&rec)
                    .get_result(conn)?;
                let placeholder = NewCatalogItem {
                    household_id: household.id,
                    product_name: "Test",
                    value_in_currency: 0.0,
                    currency: "USD",
                    xp_cost: 100,
                    product_code: "test-gift-card-code",
                    image_url: Some(
                        "https://cdn.bitrefill.com/primg/w720h432/bitrefill-giftcard-usd.webp",
                    ),
                    is_active: true,
                };
                diesel::insert_into(catalog_items::table)
                    .values(&placeholder)
                    .execute(conn)?;
                Ok(household)
            })
        })
        .await?
    }

    pub async fn attach_dependent(&self, user: &str, hid: i32) -> Result<(), StorageError> {
        use schema::dependents::dsl::*;
        let pool = self.pool.clone();
        let uid = user.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            diesel::update(dependents.filter(user_id.eq(&uid)))
                .set(household_id.eq(Some(hid)))
                .execute(&mut conn)?;
            Ok(())
        })
        .await?
    }

    pub async fn list_dependents(&self, hid: i32) -> Result<Vec<Dependent>, StorageError> {
        use schema::dependents::dsl::*;
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<Dependent>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(dependents
                .filter(household_id.eq(Some(hid)))
                .order(display_name.asc())
                .load::<Dependent>(&mut conn)?)
        })
        .await?
    }

    // --- task ledger ---

    pub async fn create_task(
        &self,
        hid: i32,
        description_: &str,
        xp: i32,
        assignee: &str,
    ) -> Result<Task, StorageError> {
        use schema::tasks;
        let pool = self.pool.clone();
        let desc = description_.to_string();
        let assignee = assignee.to_string();
        tokio::task::spawn_blocking(move || -> Result<Task, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let rec = NewTask {
                household_id: hid,
                description: &desc,
                xp_value: xp,
                assigned_dependent_uid: &assignee,
            };
            Ok(diesel::insert_into(tasks::table)
                .values(&rec)
                .get_result::<Task>(&mut conn)?)
        })
        .await?
    }

    pub async fn get_task(&self, tid: i32) -> Result<Option<Task>, StorageError> {
        use schema::tasks::dsl::*;
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Option<Task>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(tasks
                .filter(id.eq(tid))
                .first::<Task>(&mut conn)
                .optional()?)
        })
        .await?
    }

    /// Guardian view: household tasks that have no approved request, i.e.
    /// everything not yet consumed or closed.
    pub async fn list_active_tasks(&self, hid: i32) -> Result<Vec<Task>, StorageError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<Task>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            use schema::{tasks::dsl as t, xp_requests::dsl as xr};
            let consumed = xr::xp_requests
                .filter(xr::status.eq(RequestStatus::Approved.as_str()))
                .select(xr::task_id);
            Ok(t::tasks
                .filter(t::household_id.eq(hid))
                .filter(t::id.ne_all(consumed))
                .order(t::created_at.asc())
                .load::<Task>(&mut conn)?)
        })
        .await?
    }

    /// Dependent view: the caller's assigned tasks (same approved-exclusion)
    /// annotated with whether they have a pending request outstanding.
    pub async fn list_active_tasks_for_dependent(
        &self,
        hid: i32,
        dependent: &str,
    ) -> Result<Vec<(Task, bool)>, StorageError> {
        let pool = self.pool.clone();
        let dep = dependent.to_string();
        tokio::task::spawn_blocking(move || -> Result<Vec<(Task, bool)>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            use schema::{tasks::dsl as t, xp_requests::dsl as xr};
            let consumed = xr::xp_requests
                .filter(xr::status.eq(RequestStatus::Approved.as_str()))
                .select(xr::task_id);
            let rows = t::tasks
                .filter(t::household_id.eq(hid))
                .filter(t::assigned_dependent_uid.eq(&dep))
                .filter(t::id.ne_all(consumed))
                .order(t::created_at.asc())
                .load::<Task>(&mut conn)?;
            let pending_ids: Vec<i32> = xr::xp_requests
                .filter(xr::dependent_uid.eq(Some(dep.as_str())))
                .filter(xr::status.eq(RequestStatus::Pending.as_str()))
                .select(xr::task_id)
                .load::<i32>(&mut conn)?;
            let out = rows
                .into_iter()
                .map(|task| {
                    let has_pending = pending_ids.contains(&task.id);
                    (task, has_pending)
                })
                .collect();
            Ok(out)
        })
        .await?
    }

    /// Ledger closure, not row removal: force-approve every request tied to
    /// the task, or insert a synthetic approved request with null requester
    /// and value when none exists. The task then drops out of active lists.
    pub async fn close_task(&self, hid: i32, tid: i32) -> Result<bool, StorageError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<bool, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            use schema::{tasks::dsl as t, xp_requests};
            conn.immediate_transaction(|conn| -> Result<bool, StorageError> {
                let exists: i64 = t::tasks
                    .filter(t::id.eq(tid))
                    .filter(t::household_id.eq(hid))
                    .count()
                    .get_result(conn)?;
                if exists == 0 {
                    return Ok(false);
                }
                let now = Utc::now().naive_utc();
                let updated = diesel::update(
                    xp_requests::table.filter(xp_requests::task_id.eq(tid)),
                )
                .set((
                    xp_requests::status.eq(RequestStatus::Approved.as_str()),
                    xp_requests::processed_at.eq(Some(now)),
                ))
                .execute(conn)?;
                if updated == 0 {
                    let synthetic = NewXpRequest {
                        household_id: hid,
                        task_id: tid,
                        dependent_uid: None,
                        requested_xp: None,
                        status: RequestStatus::Approved.as_str(),
                        processed_at: Some(now),
                    };
                    diesel::insert_into(xp_requests::table)
                        .values(&synthetic)
                        .execute(conn)?;
                }
                Ok(true)
            })
        })
        .await?
    }

    // --- XP request workflow ---

    /// Atomic check-then-insert; the partial unique index on pending rows
    /// backstops the check against concurrent writers.
    pub async fn submit_request(
        &self,
        hid: i32,
        tid: i32,
        dependent: &str,
    ) -> Result<SubmitOutcome, StorageError> {
        let pool = self.pool.clone();
        let dep = dependent.to_string();
        tokio::task::spawn_blocking(move || -> Result<SubmitOutcome, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            use schema::{tasks::dsl as t, xp_requests};
            let outcome = conn.immediate_transaction(|conn| -> Result<SubmitOutcome, StorageError> {
                let task: Option<Task> = t::tasks
                    .filter(t::id.eq(tid))
                    .filter(t::household_id.eq(hid))
                    .filter(t::assigned_dependent_uid.eq(&dep))
                    .first::<Task>(conn)
                    .optional()?;
                let Some(task) = task else {
                    return Ok(SubmitOutcome::TaskNotFound);
                };
                let pending: i64 = xp_requests::table
                    .filter(xp_requests::task_id.eq(tid))
                    .filter(xp_requests::dependent_uid.eq(Some(dep.as_str())))
                    .filter(xp_requests::status.eq(RequestStatus::Pending.as_str()))
                    .count()
                    .get_result(conn)?;
                if pending > 0 {
                    return Ok(SubmitOutcome::AlreadyPending);
                }
                let rec = NewXpRequest {
                    household_id: hid,
                    task_id: tid,
                    dependent_uid: Some(&dep),
                    requested_xp: Some(task.xp_value),
                    status: RequestStatus::Pending.as_str(),
                    processed_at: None,
                };
                let row: XpRequest = diesel::insert_into(xp_requests::table)
                    .values(&rec)
                    .get_result(conn)?;
                Ok(SubmitOutcome::Created(row))
            });
            match outcome {
                Err(StorageError::Database(DieselError::DatabaseError(
                    DatabaseErrorKind::UniqueViolation,
                    _,
                ))) => Ok(SubmitOutcome::AlreadyPending),
                other => other,
            }
        })
        .await?
    }

    /// Pending requests for the guardian view, joined with the requesting
    /// dependent's name and the task description. Synthetic closure rows
    /// never show up here (they are born approved).
    pub async fn list_pending_requests(
        &self,
        hid: i32,
        only_dependent: Option<&str>,
    ) -> Result<Vec<(XpRequest, String, String)>, StorageError> {
        let pool = self.pool.clone();
        let dep_filter = only_dependent.map(|s| s.to_string());
        tokio::task::spawn_blocking(
            move || -> Result<Vec<(XpRequest, String, String)>, StorageError> {
                let mut conn = pool.get()?;
                configure_sqlite_conn(&mut conn)?;
                use schema::{dependents, tasks, xp_requests};
                let mut query = xp_requests::table
                    .inner_join(tasks::table.on(tasks::id.eq(xp_requests::task_id)))
                    .inner_join(
                        dependents::table
                            .on(xp_requests::dependent_uid.eq(dependents::user_id.nullable())),
                    )
                    .filter(xp_requests::household_id.eq(hid))
                    .filter(xp_requests::status.eq(RequestStatus::Pending.as_str()))
                    .order(xp_requests::created_at.desc())
                    .select((
                        XpRequest::as_select(),
                        dependents::display_name,
                        tasks::description,
                    ))
                    .into_boxed();
                if let Some(dep) = &dep_filter {
                    query = query.filter(xp_requests::dependent_uid.eq(Some(dep.clone())));
                }
                let rows = query.load::<(XpRequest, String, String)>(&mut conn)?;
                Ok(rows)
            },
        )
        .await?
    }

    /// Flip a pending request to a terminal state; for approvals, credit
    /// the dependent's balance in the same transaction so an approved but
    /// uncredited request cannot exist.
    pub async fn decide_request(
        &self,
        hid: i32,
        rid: i32,
        approve: bool,
    ) -> Result<DecisionOutcome, StorageError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<DecisionOutcome, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            use schema::{dependents, xp_requests};
            conn.immediate_transaction(|conn| -> Result<DecisionOutcome, StorageError> {
                let req: Option<XpRequest> = xp_requests::table
                    .filter(xp_requests::id.eq(rid))
                    .filter(xp_requests::household_id.eq(hid))
                    .first::<XpRequest>(conn)
                    .optional()?;
                let Some(req) = req else {
                    return Ok(DecisionOutcome::NotFound);
                };
                if req.status != RequestStatus::Pending.as_str() {
                    return Ok(DecisionOutcome::NotPending);
                }
                let now = Utc::now().naive_utc();
                let target = if approve {
                    RequestStatus::Approved
                } else {
                    RequestStatus::Denied
                };
                // Guard on status again so a racing decision loses cleanly.
                let updated = diesel::update(
                    xp_requests::table
                        .filter(xp_requests::id.eq(rid))
                        .filter(xp_requests::status.eq(RequestStatus::Pending.as_str())),
                )
                .set((
                    xp_requests::status.eq(target.as_str()),
                    xp_requests::processed_at.eq(Some(now)),
                ))
                .execute(conn)?;
                if updated == 0 {
                    return Ok(DecisionOutcome::NotPending);
                }
                let requested = req.requested_xp.unwrap_or(0);
                let mut new_balance = None;
                if approve {
                    if let Some(dep) = &req.dependent_uid {
                        diesel::update(
                            dependents::table.filter(dependents::user_id.eq(dep)),
                        )
                        .set(dependents::xp_balance.eq(dependents::xp_balance + requested))
                        .execute(conn)?;
                        let balance: i32 = dependents::table
                            .filter(dependents::user_id.eq(dep))
                            .select(dependents::xp_balance)
                            .first(conn)?;
                        new_balance = Some(balance);
                    }
                }
                Ok(DecisionOutcome::Applied {
                    dependent_uid: req.dependent_uid.clone(),
                    requested_xp: requested,
                    new_balance,
                })
            })
        })
        .await?
    }

    // --- balances & redemption ---

    /// Conditional debit: only succeeds while the balance covers the
    /// amount, so a concurrent spend can never drive it negative. Returns
    /// the new balance, or None when the guard failed.
    pub async fn debit_balance(
        &self,
        dependent: &str,
        amount: i32,
    ) -> Result<Option<i32>, StorageError> {
        let pool = self.pool.clone();
        let dep = dependent.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<i32>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            use schema::dependents::dsl::*;
            conn.immediate_transaction(|conn| -> Result<Option<i32>, StorageError> {
                let updated = diesel::update(
                    dependents
                        .filter(user_id.eq(&dep))
                        .filter(xp_balance.ge(amount)),
                )
                .set(xp_balance.eq(xp_balance - amount))
                .execute(conn)?;
                if updated == 0 {
                    return Ok(None);
                }
                let balance: i32 = dependents
                    .filter(user_id.eq(&dep))
                    .select(xp_balance)
                    .first(conn)?;
                Ok(Some(balance))
            })
        })
        .await?
    }

    // --- catalog ---

    pub async fn list_catalog(&self, hid: i32) -> Result<Vec<CatalogItem>, StorageError> {
        use schema::catalog_items::dsl::*;
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<CatalogItem>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(catalog_items
                .filter(household_id.eq(hid))
                .filter(is_active.eq(true))
                .order(created_at.asc())
                .load::<CatalogItem>(&mut conn)?)
        })
        .await?
    }

    pub async fn add_catalog_item(
        &self,
        hid: i32,
        name: &str,
        value: f64,
        currency_: &str,
        xp_cost_: i32,
        code: &str,
        image: Option<&str>,
    ) -> Result<CatalogItem, StorageError> {
        use schema::catalog_items;
        let pool = self.pool.clone();
        let name = name.to_string();
        let currency_owned = currency_.to_string();
        let code = code.to_string();
        let image_owned = image.map(|s| s.to_string());
        tokio::task::spawn_blocking(move || -> Result<CatalogItem, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let rec = NewCatalogItem {
                household_id: hid,
                product_name: &name,
                value_in_currency: value,
                currency: &currency_owned,
                xp_cost: xp_cost_,
                product_code: &code,
                image_url: image_owned.as_deref(),
                is_active: true,
            };
            Ok(diesel::insert_into(catalog_items::table)
                .values(&rec)
                .get_result::<CatalogItem>(&mut conn)?)
        })
        .await?
    }
}

fn configure_sqlite_conn(conn: &mut SqliteConnection) -> Result<(), diesel::result::Error> {
    // Enable WAL for better read/write concurrency and set a busy timeout
    // Ignore the result rows; Diesel's execute is fine for PRAGMAs
    diesel::sql_query("PRAGMA journal_mode=WAL;").execute(conn)?;
    diesel::sql_query("PRAGMA synchronous=NORMAL;").execute(conn)?;
    diesel::sql_query("PRAGMA busy_timeout=5000;").execute(conn)?;
    diesel::sql_query("PRAGMA foreign_keys=ON;").execute(conn)?;
    Ok(())
}
