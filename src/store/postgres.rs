use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{
    postgres::{PgPoolOptions, PgRow},
    PgConnection, PgPool, Row,
};

use crate::error::{AppError, AppResult};
use crate::logic::{
    next_code, plan_adjustment, plan_cancellation, plan_completion, plan_item_removal,
    plan_opening_stock, plan_stock_in, plan_stock_out, product_ids, BILL_NUMBER_WIDTH,
    JOB_NUMBER_WIDTH, SKU_WIDTH,
};
use crate::model::{
    Bill, BillFilter, Branch, Category, CompletionRequest, Customer, CustomerFilter, Id, JobOrder,
    JobOrderFilter, JobOrderItem, JobOrderUpdate, NewCustomer, PaymentMethod, PaymentStatus,
    Product, ProductFilter, Session, SessionUser, StockLine, StockOutReceipt, StockOutTarget,
    StockTransaction, StockTransactionFilter, Tenant, User, BILL_NUMBER_PREFIX, JOB_NUMBER_PREFIX,
};
use crate::store::traits::{
    BillStore, CatalogStore, CustomerStore, JobOrderStore, LedgerStore, SessionStore, Store,
    TenantStore, UserStore,
};

const BRANCH_COLUMNS: &str = "id, tenant_id, name, address, is_active, created_at";
const USER_COLUMNS: &str =
    "id, tenant_id, branch_id, username, display_name, password_hash, role, is_active, created_at";
const CATEGORY_COLUMNS: &str = "id, tenant_id, name, code, created_at";
const PRODUCT_COLUMNS: &str = "id, tenant_id, branch_id, category_id, sku, name, description, unit, \
     cost_price, selling_price, stock_quantity, reorder_level, is_active, created_at, updated_at";
const CUSTOMER_COLUMNS: &str =
    "id, tenant_id, name, phone, plate_number, vehicle_make, vehicle_model, created_at";
const JOB_ORDER_COLUMNS: &str = "id, tenant_id, branch_id, job_number, customer_id, description, \
     status, labor_cost, created_by, created_at, updated_at, completed_at";
const ITEM_COLUMNS: &str = "id, job_order_id, product_id, quantity, unit_price, created_at";
const TRANSACTION_COLUMNS: &str = "id, tenant_id, product_id, branch_id, quantity, kind, \
     job_order_id, balance_after, note, created_by, created_at";
const BILL_COLUMNS: &str = "id, tenant_id, job_order_id, bill_number, subtotal, labor, vat_rate, \
     vat_amount, grand_total, payment_method, payment_status, created_by, created_at, paid_at";

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store with the given database URL
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to create PostgreSQL connection pool")?;

        Ok(Self { pool })
    }

    /// Apply the embedded migrations in `migrations/`.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }
}

/// Turn a unique-constraint violation into a conflict; pass anything else on.
fn conflict_on_unique(err: sqlx::Error, message: impl Into<String>) -> AppError {
    let unique = err
        .as_database_error()
        .map_or(false, |db| db.is_unique_violation());
    if unique {
        AppError::Conflict(message.into())
    } else {
        AppError::Database(err)
    }
}

fn parse_column<T>(row: &PgRow, column: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.try_get(column)?;
    raw.parse::<T>()
        .with_context(|| format!("Invalid value in column {}", column))
}

fn branch_from_row(row: &PgRow) -> Result<Branch> {
    Ok(Branch {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        name: row.try_get("name")?,
        address: row.try_get("address")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
    })
}

fn user_from_row(row: &PgRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        branch_id: row.try_get("branch_id")?,
        username: row.try_get("username")?,
        display_name: row.try_get("display_name")?,
        password_hash: row.try_get("password_hash")?,
        role: parse_column(row, "role")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
    })
}

fn category_from_row(row: &PgRow) -> Result<Category> {
    Ok(Category {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        name: row.try_get("name")?,
        code: row.try_get("code")?,
        created_at: row.try_get("created_at")?,
    })
}

fn product_from_row(row: &PgRow) -> Result<Product> {
    Ok(Product {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        branch_id: row.try_get("branch_id")?,
        category_id: row.try_get("category_id")?,
        sku: row.try_get("sku")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        unit: row.try_get("unit")?,
        cost_price: row.try_get("cost_price")?,
        selling_price: row.try_get("selling_price")?,
        stock_quantity: row.try_get("stock_quantity")?,
        reorder_level: row.try_get("reorder_level")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn customer_from_row(row: &PgRow) -> Result<Customer> {
    Ok(Customer {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        name: row.try_get("name")?,
        phone: row.try_get("phone")?,
        plate_number: row.try_get("plate_number")?,
        vehicle_make: row.try_get("vehicle_make")?,
        vehicle_model: row.try_get("vehicle_model")?,
        created_at: row.try_get("created_at")?,
    })
}

fn job_order_from_row(row: &PgRow) -> Result<JobOrder> {
    Ok(JobOrder {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        branch_id: row.try_get("branch_id")?,
        job_number: row.try_get("job_number")?,
        customer_id: row.try_get("customer_id")?,
        description: row.try_get("description")?,
        status: parse_column(row, "status")?,
        labor_cost: row.try_get("labor_cost")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

fn item_from_row(row: &PgRow) -> Result<JobOrderItem> {
    Ok(JobOrderItem {
        id: row.try_get("id")?,
        job_order_id: row.try_get("job_order_id")?,
        product_id: row.try_get("product_id")?,
        quantity: row.try_get("quantity")?,
        unit_price: row.try_get("unit_price")?,
        created_at: row.try_get("created_at")?,
    })
}

fn transaction_from_row(row: &PgRow) -> Result<StockTransaction> {
    Ok(StockTransaction {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        product_id: row.try_get("product_id")?,
        branch_id: row.try_get("branch_id")?,
        quantity: row.try_get("quantity")?,
        kind: parse_column(row, "kind")?,
        job_order_id: row.try_get("job_order_id")?,
        balance_after: row.try_get("balance_after")?,
        note: row.try_get("note")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
    })
}

fn bill_from_row(row: &PgRow) -> Result<Bill> {
    Ok(Bill {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        job_order_id: row.try_get("job_order_id")?,
        bill_number: row.try_get("bill_number")?,
        subtotal: row.try_get("subtotal")?,
        labor: row.try_get("labor")?,
        vat_rate: row.try_get("vat_rate")?,
        vat_amount: row.try_get("vat_amount")?,
        grand_total: row.try_get("grand_total")?,
        payment_method: parse_column(row, "payment_method")?,
        payment_status: parse_column(row, "payment_status")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
        paid_at: row.try_get("paid_at")?,
    })
}

fn rows_to<T>(rows: &[PgRow], map: fn(&PgRow) -> Result<T>) -> Result<Vec<T>> {
    rows.iter().map(map).collect()
}

// Helpers below run on a connection borrowed from an open transaction.

/// Allocate the next `{prefix}-{digits}` code for a tenant. The advisory lock
/// serializes allocation per tenant and family until the transaction ends.
async fn allocate_code(
    conn: &mut PgConnection,
    tenant_id: &str,
    table: &str,
    column: &str,
    prefix: &str,
    width: usize,
) -> AppResult<String> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(format!("{}:{}:{}", tenant_id, table, prefix))
        .execute(&mut *conn)
        .await?;

    let existing: Vec<String> = sqlx::query_scalar(&format!(
        "SELECT {column} FROM {table} WHERE tenant_id = $1 AND {column} LIKE $2",
    ))
    .bind(tenant_id)
    .bind(format!("{}-%", prefix))
    .fetch_all(&mut *conn)
    .await?;

    Ok(next_code(prefix, width, &existing))
}

async fn lock_products(
    conn: &mut PgConnection,
    tenant_id: &str,
    ids: &[Id],
) -> AppResult<Vec<Product>> {
    // Fixed lock order so concurrent workflows cannot deadlock.
    let rows = sqlx::query(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE tenant_id = $1 AND id = ANY($2) \
         ORDER BY id FOR UPDATE"
    ))
    .bind(tenant_id)
    .bind(ids)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows_to(&rows, product_from_row)?)
}

async fn lock_job_order(conn: &mut PgConnection, tenant_id: &str, id: &str) -> AppResult<JobOrder> {
    let row = sqlx::query(&format!(
        "SELECT {JOB_ORDER_COLUMNS} FROM job_orders WHERE tenant_id = $1 AND id = $2 FOR UPDATE"
    ))
    .bind(tenant_id)
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    match row {
        Some(row) => Ok(job_order_from_row(&row)?),
        None => Err(AppError::not_found(format!("job order {}", id))),
    }
}

async fn job_items(conn: &mut PgConnection, job_order_id: &str) -> AppResult<Vec<JobOrderItem>> {
    let rows = sqlx::query(&format!(
        "SELECT {ITEM_COLUMNS} FROM job_order_items WHERE job_order_id = $1 ORDER BY created_at, id"
    ))
    .bind(job_order_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows_to(&rows, item_from_row)?)
}

async fn insert_product(conn: &mut PgConnection, product: &Product) -> AppResult<()> {
    sqlx::query(&format!(
        "INSERT INTO products ({PRODUCT_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)"
    ))
    .bind(&product.id)
    .bind(&product.tenant_id)
    .bind(&product.branch_id)
    .bind(&product.category_id)
    .bind(&product.sku)
    .bind(&product.name)
    .bind(&product.description)
    .bind(&product.unit)
    .bind(product.cost_price)
    .bind(product.selling_price)
    .bind(product.stock_quantity)
    .bind(product.reorder_level)
    .bind(product.is_active)
    .bind(product.created_at)
    .bind(product.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| conflict_on_unique(e, format!("sku '{}' is already used", product.sku)))?;
    Ok(())
}

/// Write planned counters and their ledger rows together.
async fn apply_stock(
    conn: &mut PgConnection,
    products: &[Product],
    transactions: &[StockTransaction],
) -> AppResult<()> {
    for product in products {
        sqlx::query("UPDATE products SET stock_quantity = $1, updated_at = $2 WHERE id = $3")
            .bind(product.stock_quantity)
            .bind(product.updated_at)
            .bind(&product.id)
            .execute(&mut *conn)
            .await?;
    }
    for txn in transactions {
        sqlx::query(&format!(
            "INSERT INTO stock_transactions ({TRANSACTION_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
        ))
        .bind(&txn.id)
        .bind(&txn.tenant_id)
        .bind(&txn.product_id)
        .bind(&txn.branch_id)
        .bind(txn.quantity)
        .bind(txn.kind.as_str())
        .bind(&txn.job_order_id)
        .bind(txn.balance_after)
        .bind(&txn.note)
        .bind(&txn.created_by)
        .bind(txn.created_at)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn write_job_order(conn: &mut PgConnection, job: &JobOrder) -> AppResult<()> {
    sqlx::query(
        "UPDATE job_orders SET description = $1, status = $2, labor_cost = $3, \
         updated_at = $4, completed_at = $5 WHERE id = $6",
    )
    .bind(&job.description)
    .bind(job.status.as_str())
    .bind(job.labor_cost)
    .bind(job.updated_at)
    .bind(job.completed_at)
    .bind(&job.id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn find_or_create_customer_in(
    conn: &mut PgConnection,
    tenant_id: &Id,
    new: NewCustomer,
) -> AppResult<(Customer, bool)> {
    new.validate()?;
    let candidate = new.into_customer(tenant_id.clone());

    let inserted = sqlx::query(&format!(
        "INSERT INTO customers ({CUSTOMER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         ON CONFLICT (tenant_id, plate_number) DO NOTHING RETURNING {CUSTOMER_COLUMNS}"
    ))
    .bind(&candidate.id)
    .bind(&candidate.tenant_id)
    .bind(&candidate.name)
    .bind(&candidate.phone)
    .bind(&candidate.plate_number)
    .bind(&candidate.vehicle_make)
    .bind(&candidate.vehicle_model)
    .bind(candidate.created_at)
    .fetch_optional(&mut *conn)
    .await?;
    if let Some(row) = inserted {
        return Ok((customer_from_row(&row)?, true));
    }

    let row = sqlx::query(&format!(
        "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE tenant_id = $1 AND plate_number = $2"
    ))
    .bind(tenant_id)
    .bind(&candidate.plate_number)
    .fetch_one(&mut *conn)
    .await?;
    Ok((customer_from_row(&row)?, false))
}

async fn open_job_order_in(
    conn: &mut PgConnection,
    actor: &SessionUser,
    branch_id: &Id,
    customer: NewCustomer,
    description: Option<String>,
) -> AppResult<JobOrder> {
    let branch_ok: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM branches WHERE tenant_id = $1 AND id = $2 AND is_active)",
    )
    .bind(&actor.tenant_id)
    .bind(branch_id)
    .fetch_one(&mut *conn)
    .await?;
    if !branch_ok {
        return Err(AppError::not_found(format!("branch {}", branch_id)));
    }

    let (customer, _) = find_or_create_customer_in(conn, &actor.tenant_id, customer).await?;
    let job_number = allocate_code(
        conn,
        &actor.tenant_id,
        "job_orders",
        "job_number",
        JOB_NUMBER_PREFIX,
        JOB_NUMBER_WIDTH,
    )
    .await?;
    let job = JobOrder::open(
        actor.tenant_id.clone(),
        branch_id.clone(),
        job_number,
        customer.id,
        description,
        actor.user_id.clone(),
    );

    sqlx::query(&format!(
        "INSERT INTO job_orders ({JOB_ORDER_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"
    ))
    .bind(&job.id)
    .bind(&job.tenant_id)
    .bind(&job.branch_id)
    .bind(&job.job_number)
    .bind(&job.customer_id)
    .bind(&job.description)
    .bind(job.status.as_str())
    .bind(job.labor_cost)
    .bind(&job.created_by)
    .bind(job.created_at)
    .bind(job.updated_at)
    .bind(job.completed_at)
    .execute(&mut *conn)
    .await?;
    Ok(job)
}

#[async_trait::async_trait]
impl TenantStore for PostgresStore {
    async fn register_tenant(&self, tenant: Tenant, branch: Branch, admin: User) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO tenants (id, name, created_at) VALUES ($1, $2, $3)")
            .bind(&tenant.id)
            .bind(&tenant.name)
            .bind(tenant.created_at)
            .execute(&mut *tx)
            .await?;
        insert_branch_row(&mut tx, &branch).await?;
        insert_user_row(&mut tx, &admin).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_branches(&self, tenant_id: &Id) -> Result<Vec<Branch>> {
        let rows = sqlx::query(&format!(
            "SELECT {BRANCH_COLUMNS} FROM branches WHERE tenant_id = $1 ORDER BY created_at"
        ))
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list branches")?;
        rows_to(&rows, branch_from_row)
    }

    async fn get_branch(&self, tenant_id: &Id, id: &Id) -> Result<Option<Branch>> {
        let row = sqlx::query(&format!(
            "SELECT {BRANCH_COLUMNS} FROM branches WHERE tenant_id = $1 AND id = $2"
        ))
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch branch")?;
        row.as_ref().map(branch_from_row).transpose()
    }

    async fn insert_branch(&self, branch: Branch) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        insert_branch_row(&mut conn, &branch)
            .await
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to insert branch")
    }
}

async fn insert_branch_row(conn: &mut PgConnection, branch: &Branch) -> AppResult<()> {
    sqlx::query(&format!(
        "INSERT INTO branches ({BRANCH_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6)"
    ))
    .bind(&branch.id)
    .bind(&branch.tenant_id)
    .bind(&branch.name)
    .bind(&branch.address)
    .bind(branch.is_active)
    .bind(branch.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_user_row(conn: &mut PgConnection, user: &User) -> AppResult<()> {
    sqlx::query(&format!(
        "INSERT INTO users ({USER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
    ))
    .bind(&user.id)
    .bind(&user.tenant_id)
    .bind(&user.branch_id)
    .bind(&user.username)
    .bind(&user.display_name)
    .bind(&user.password_hash)
    .bind(user.role.as_str())
    .bind(user.is_active)
    .bind(user.created_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| conflict_on_unique(e, format!("username '{}' is already taken", user.username)))?;
    Ok(())
}

#[async_trait::async_trait]
impl UserStore for PostgresStore {
    async fn get_user(&self, id: &Id) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user")?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1"))
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user by username")?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn list_users(&self, tenant_id: &Id) -> Result<Vec<User>> {
        let rows = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE tenant_id = $1 ORDER BY username"
        ))
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list users")?;
        rows_to(&rows, user_from_row)
    }

    async fn insert_user(&self, user: User) -> AppResult<()> {
        let mut conn = self.pool.acquire().await?;
        insert_user_row(&mut conn, &user).await
    }

    async fn update_user(&self, user: User) -> Result<()> {
        sqlx::query(
            "UPDATE users SET branch_id = $1, display_name = $2, password_hash = $3, role = $4, \
             is_active = $5 WHERE id = $6",
        )
        .bind(&user.branch_id)
        .bind(&user.display_name)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.is_active)
        .bind(&user.id)
        .execute(&self.pool)
        .await
        .context("Failed to update user")?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl SessionStore for PostgresStore {
    async fn insert_session(&self, session: Session) -> Result<()> {
        sqlx::query(
            "INSERT INTO sessions (token_hash, user_id, tenant_id, created_at, expires_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&session.token_hash)
        .bind(&session.user_id)
        .bind(&session.tenant_id)
        .bind(session.created_at)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert session")?;
        Ok(())
    }

    async fn get_session(&self, token_hash: &str) -> Result<Option<Session>> {
        let row = sqlx::query(
            "SELECT token_hash, user_id, tenant_id, created_at, expires_at \
             FROM sessions WHERE token_hash = $1",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch session")?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(Session {
            token_hash: row.try_get("token_hash")?,
            user_id: row.try_get("user_id")?,
            tenant_id: row.try_get("tenant_id")?,
            created_at: row.try_get("created_at")?,
            expires_at: row.try_get("expires_at")?,
        }))
    }

    async fn delete_session(&self, token_hash: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE token_hash = $1")
            .bind(token_hash)
            .execute(&self.pool)
            .await
            .context("Failed to delete session")?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .context("Failed to purge expired sessions")?;
        Ok(result.rows_affected())
    }
}

#[async_trait::async_trait]
impl CatalogStore for PostgresStore {
    async fn list_categories(&self, tenant_id: &Id) -> Result<Vec<Category>> {
        let rows = sqlx::query(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories WHERE tenant_id = $1 ORDER BY name"
        ))
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list categories")?;
        rows_to(&rows, category_from_row)
    }

    async fn get_category(&self, tenant_id: &Id, id: &Id) -> Result<Option<Category>> {
        let row = sqlx::query(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories WHERE tenant_id = $1 AND id = $2"
        ))
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch category")?;
        row.as_ref().map(category_from_row).transpose()
    }

    async fn insert_category(&self, category: Category) -> AppResult<()> {
        sqlx::query(&format!(
            "INSERT INTO categories ({CATEGORY_COLUMNS}) VALUES ($1, $2, $3, $4, $5)"
        ))
        .bind(&category.id)
        .bind(&category.tenant_id)
        .bind(&category.name)
        .bind(&category.code)
        .bind(category.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            conflict_on_unique(e, format!("category code '{}' is already used", category.code))
        })?;
        Ok(())
    }

    async fn list_products(&self, tenant_id: &Id, filter: &ProductFilter) -> Result<Vec<Product>> {
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE tenant_id = $1 \
             AND ($2::text IS NULL OR branch_id = $2) \
             AND ($3::text IS NULL OR category_id = $3) \
             ORDER BY sku"
        ))
        .bind(tenant_id)
        .bind(&filter.branch_id)
        .bind(&filter.category_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list products")?;

        let products = rows_to(&rows, product_from_row)?;
        Ok(products.into_iter().filter(|p| filter.matches(p)).collect())
    }

    async fn get_product(&self, tenant_id: &Id, id: &Id) -> Result<Option<Product>> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE tenant_id = $1 AND id = $2"
        ))
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch product")?;
        row.as_ref().map(product_from_row).transpose()
    }

    async fn create_product(
        &self,
        actor: &SessionUser,
        mut product: Product,
        sku_prefix: &str,
        opening_stock: i32,
    ) -> AppResult<Product> {
        let mut tx = self.pool.begin().await?;

        if product.sku.is_empty() {
            product.sku = allocate_code(
                &mut tx,
                &product.tenant_id,
                "products",
                "sku",
                sku_prefix,
                SKU_WIDTH,
            )
            .await?;
        }

        let created = match plan_opening_stock(actor, &product, opening_stock)? {
            Some(plan) => {
                insert_product(&mut tx, &plan.product).await?;
                apply_stock(&mut tx, &[], &[plan.transaction]).await?;
                plan.product
            }
            None => {
                insert_product(&mut tx, &product).await?;
                product
            }
        };

        tx.commit().await?;
        Ok(created)
    }

    async fn update_product(&self, product: Product) -> Result<()> {
        sqlx::query(
            "UPDATE products SET category_id = $1, name = $2, description = $3, unit = $4, \
             cost_price = $5, selling_price = $6, reorder_level = $7, is_active = $8, \
             updated_at = $9 WHERE id = $10",
        )
        .bind(&product.category_id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(&product.unit)
        .bind(product.cost_price)
        .bind(product.selling_price)
        .bind(product.reorder_level)
        .bind(product.is_active)
        .bind(product.updated_at)
        .bind(&product.id)
        .execute(&self.pool)
        .await
        .context("Failed to update product")?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl CustomerStore for PostgresStore {
    async fn list_customers(
        &self,
        tenant_id: &Id,
        filter: &CustomerFilter,
    ) -> Result<Vec<Customer>> {
        let rows = sqlx::query(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE tenant_id = $1 ORDER BY name"
        ))
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list customers")?;

        let customers = rows_to(&rows, customer_from_row)?;
        Ok(customers.into_iter().filter(|c| filter.matches(c)).collect())
    }

    async fn get_customer(&self, tenant_id: &Id, id: &Id) -> Result<Option<Customer>> {
        let row = sqlx::query(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE tenant_id = $1 AND id = $2"
        ))
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch customer")?;
        row.as_ref().map(customer_from_row).transpose()
    }

    async fn find_or_create_customer(
        &self,
        tenant_id: &Id,
        customer: NewCustomer,
    ) -> AppResult<(Customer, bool)> {
        let mut conn = self.pool.acquire().await?;
        find_or_create_customer_in(&mut conn, tenant_id, customer).await
    }

    async fn update_customer(&self, customer: Customer) -> AppResult<()> {
        sqlx::query(
            "UPDATE customers SET name = $1, phone = $2, plate_number = $3, vehicle_make = $4, \
             vehicle_model = $5 WHERE tenant_id = $6 AND id = $7",
        )
        .bind(&customer.name)
        .bind(&customer.phone)
        .bind(&customer.plate_number)
        .bind(&customer.vehicle_make)
        .bind(&customer.vehicle_model)
        .bind(&customer.tenant_id)
        .bind(&customer.id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            conflict_on_unique(
                e,
                format!("plate '{}' belongs to another customer", customer.plate_number),
            )
        })?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl JobOrderStore for PostgresStore {
    async fn list_job_orders(
        &self,
        tenant_id: &Id,
        filter: &JobOrderFilter,
    ) -> Result<Vec<JobOrder>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_ORDER_COLUMNS} FROM job_orders WHERE tenant_id = $1 \
             AND ($2::text IS NULL OR status = $2) \
             AND ($3::text IS NULL OR customer_id = $3) \
             AND ($4::text IS NULL OR branch_id = $4) \
             ORDER BY created_at DESC, job_number DESC"
        ))
        .bind(tenant_id)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(&filter.customer_id)
        .bind(&filter.branch_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list job orders")?;
        rows_to(&rows, job_order_from_row)
    }

    async fn get_job_order(&self, tenant_id: &Id, id: &Id) -> Result<Option<JobOrder>> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_ORDER_COLUMNS} FROM job_orders WHERE tenant_id = $1 AND id = $2"
        ))
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch job order")?;
        row.as_ref().map(job_order_from_row).transpose()
    }

    async fn list_job_order_items(&self, job_order_id: &Id) -> Result<Vec<JobOrderItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM job_order_items WHERE job_order_id = $1 \
             ORDER BY created_at, id"
        ))
        .bind(job_order_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list job order items")?;
        rows_to(&rows, item_from_row)
    }

    async fn open_job_order(
        &self,
        actor: &SessionUser,
        branch_id: &Id,
        customer: NewCustomer,
        description: Option<String>,
    ) -> AppResult<JobOrder> {
        let mut tx = self.pool.begin().await?;
        let job = open_job_order_in(&mut tx, actor, branch_id, customer, description).await?;
        tx.commit().await?;
        Ok(job)
    }

    async fn update_job_details(
        &self,
        actor: &SessionUser,
        job_order_id: &Id,
        update: &JobOrderUpdate,
    ) -> AppResult<JobOrder> {
        update.validate()?;
        let mut tx = self.pool.begin().await?;
        let mut job = lock_job_order(&mut tx, &actor.tenant_id, job_order_id).await?;
        actor.require_branch(&job.branch_id)?;
        update.apply_to(&mut job)?;

        sqlx::query(
            "UPDATE job_orders SET description = $1, labor_cost = $2, updated_at = $3 \
             WHERE id = $4",
        )
        .bind(&job.description)
        .bind(job.labor_cost)
        .bind(job.updated_at)
        .bind(&job.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(job)
    }
}

#[async_trait::async_trait]
impl LedgerStore for PostgresStore {
    async fn stock_in(
        &self,
        actor: &SessionUser,
        lines: &[StockLine],
        note: Option<&str>,
    ) -> AppResult<Vec<StockTransaction>> {
        let mut tx = self.pool.begin().await?;
        let products = lock_products(&mut tx, &actor.tenant_id, &product_ids(lines)).await?;
        let plan = plan_stock_in(actor, &products, lines, note)?;
        apply_stock(&mut tx, &plan.products, &plan.transactions).await?;
        tx.commit().await?;
        Ok(plan.transactions)
    }

    async fn adjust_stock(
        &self,
        actor: &SessionUser,
        product_id: &Id,
        counted_quantity: i32,
        note: Option<&str>,
    ) -> AppResult<StockTransaction> {
        let mut tx = self.pool.begin().await?;
        let product = lock_products(&mut tx, &actor.tenant_id, std::slice::from_ref(product_id))
            .await?
            .pop()
            .ok_or_else(|| AppError::not_found(format!("product {}", product_id)))?;
        let plan = plan_adjustment(actor, &product, counted_quantity, note)?;
        apply_stock(
            &mut tx,
            std::slice::from_ref(&plan.product),
            std::slice::from_ref(&plan.transaction),
        )
        .await?;
        tx.commit().await?;
        Ok(plan.transaction)
    }

    async fn stock_out(
        &self,
        actor: &SessionUser,
        target: StockOutTarget,
        lines: &[StockLine],
    ) -> AppResult<StockOutReceipt> {
        let mut tx = self.pool.begin().await?;

        let job = match target {
            StockOutTarget::JobOrder(id) => lock_job_order(&mut tx, &actor.tenant_id, &id).await?,
            StockOutTarget::WalkIn(walk_in) => {
                open_job_order_in(
                    &mut tx,
                    actor,
                    &walk_in.branch_id,
                    walk_in.customer,
                    walk_in.description,
                )
                .await?
            }
        };
        let products = lock_products(&mut tx, &actor.tenant_id, &product_ids(lines)).await?;
        let existing = job_items(&mut tx, &job.id).await?;
        let plan = plan_stock_out(actor, &job, &products, &existing, lines)?;

        for change in &plan.item_changes {
            let item = &change.item;
            if change.is_new {
                sqlx::query(&format!(
                    "INSERT INTO job_order_items ({ITEM_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6)"
                ))
                .bind(&item.id)
                .bind(&item.job_order_id)
                .bind(&item.product_id)
                .bind(item.quantity)
                .bind(item.unit_price)
                .bind(item.created_at)
                .execute(&mut *tx)
                .await?;
            } else {
                sqlx::query("UPDATE job_order_items SET quantity = $1 WHERE id = $2")
                    .bind(item.quantity)
                    .bind(&item.id)
                    .execute(&mut *tx)
                    .await?;
            }
        }
        apply_stock(&mut tx, &plan.products, &plan.transactions).await?;
        if plan.promoted {
            write_job_order(&mut tx, &plan.job_order).await?;
        }
        let items = job_items(&mut tx, &plan.job_order.id).await?;

        tx.commit().await?;
        Ok(StockOutReceipt {
            job_order: plan.job_order,
            items,
            transactions: plan.transactions,
        })
    }

    async fn remove_job_item(
        &self,
        actor: &SessionUser,
        job_order_id: &Id,
        item_id: &Id,
    ) -> AppResult<StockTransaction> {
        let mut tx = self.pool.begin().await?;
        let job = lock_job_order(&mut tx, &actor.tenant_id, job_order_id).await?;
        let item = job_items(&mut tx, job_order_id)
            .await?
            .into_iter()
            .find(|i| &i.id == item_id)
            .ok_or_else(|| AppError::not_found(format!("item {}", item_id)))?;
        let product = lock_products(
            &mut tx,
            &actor.tenant_id,
            std::slice::from_ref(&item.product_id),
        )
        .await?
        .pop()
        .ok_or_else(|| AppError::not_found(format!("product {}", item.product_id)))?;

        let plan = plan_item_removal(actor, &job, &item, &product)?;
        sqlx::query("DELETE FROM job_order_items WHERE id = $1")
            .bind(&plan.removed_item_id)
            .execute(&mut *tx)
            .await?;
        apply_stock(
            &mut tx,
            std::slice::from_ref(&plan.product),
            std::slice::from_ref(&plan.transaction),
        )
        .await?;

        tx.commit().await?;
        Ok(plan.transaction)
    }

    async fn complete_job_order(
        &self,
        actor: &SessionUser,
        job_order_id: &Id,
        request: &CompletionRequest,
        vat_rate: Decimal,
    ) -> AppResult<Bill> {
        let mut tx = self.pool.begin().await?;
        let job = lock_job_order(&mut tx, &actor.tenant_id, job_order_id).await?;
        let items = job_items(&mut tx, job_order_id).await?;
        let already_billed: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM bills WHERE job_order_id = $1)")
                .bind(job_order_id)
                .fetch_one(&mut *tx)
                .await?;
        let bill_number = allocate_code(
            &mut tx,
            &actor.tenant_id,
            "bills",
            "bill_number",
            BILL_NUMBER_PREFIX,
            BILL_NUMBER_WIDTH,
        )
        .await?;

        let plan = plan_completion(
            actor,
            &job,
            &items,
            request,
            vat_rate,
            bill_number,
            already_billed,
        )?;
        write_job_order(&mut tx, &plan.job_order).await?;

        let bill = &plan.bill;
        sqlx::query(&format!(
            "INSERT INTO bills ({BILL_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"
        ))
        .bind(&bill.id)
        .bind(&bill.tenant_id)
        .bind(&bill.job_order_id)
        .bind(&bill.bill_number)
        .bind(bill.subtotal)
        .bind(bill.labor)
        .bind(bill.vat_rate)
        .bind(bill.vat_amount)
        .bind(bill.grand_total)
        .bind(bill.payment_method.as_str())
        .bind(bill.payment_status.as_str())
        .bind(&bill.created_by)
        .bind(bill.created_at)
        .bind(bill.paid_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            conflict_on_unique(e, format!("job order {} already has a bill", job.job_number))
        })?;

        tx.commit().await?;
        Ok(plan.bill)
    }

    async fn cancel_job_order(
        &self,
        actor: &SessionUser,
        job_order_id: &Id,
    ) -> AppResult<JobOrder> {
        let mut tx = self.pool.begin().await?;
        let job = lock_job_order(&mut tx, &actor.tenant_id, job_order_id).await?;
        let items = job_items(&mut tx, job_order_id).await?;
        let ids: Vec<Id> = items.iter().map(|i| i.product_id.clone()).collect();
        let products = lock_products(&mut tx, &actor.tenant_id, &ids).await?;

        let plan = plan_cancellation(actor, &job, &items, &products)?;
        sqlx::query("DELETE FROM job_order_items WHERE id = ANY($1)")
            .bind(&plan.removed_item_ids)
            .execute(&mut *tx)
            .await?;
        apply_stock(&mut tx, &plan.products, &plan.transactions).await?;
        write_job_order(&mut tx, &plan.job_order).await?;

        tx.commit().await?;
        Ok(plan.job_order)
    }

    async fn list_stock_transactions(
        &self,
        tenant_id: &Id,
        filter: &StockTransactionFilter,
    ) -> Result<Vec<StockTransaction>> {
        let rows = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM stock_transactions WHERE tenant_id = $1 \
             AND ($2::text IS NULL OR product_id = $2) \
             AND ($3::text IS NULL OR job_order_id = $3) \
             AND ($4::text IS NULL OR kind = $4) \
             AND ($5::timestamptz IS NULL OR created_at >= $5) \
             AND ($6::timestamptz IS NULL OR created_at < $6) \
             ORDER BY seq"
        ))
        .bind(tenant_id)
        .bind(&filter.product_id)
        .bind(&filter.job_order_id)
        .bind(filter.kind.map(|k| k.as_str()))
        .bind(filter.range.start())
        .bind(filter.range.end())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list stock transactions")?;
        rows_to(&rows, transaction_from_row)
    }
}

#[async_trait::async_trait]
impl BillStore for PostgresStore {
    async fn list_bills(&self, tenant_id: &Id, filter: &BillFilter) -> Result<Vec<Bill>> {
        let rows = sqlx::query(&format!(
            "SELECT {BILL_COLUMNS} FROM bills WHERE tenant_id = $1 \
             AND ($2::text IS NULL OR payment_status = $2) \
             AND ($3::timestamptz IS NULL OR created_at >= $3) \
             AND ($4::timestamptz IS NULL OR created_at < $4) \
             ORDER BY created_at DESC"
        ))
        .bind(tenant_id)
        .bind(filter.payment_status.map(|s| s.as_str()))
        .bind(filter.range.start())
        .bind(filter.range.end())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list bills")?;
        rows_to(&rows, bill_from_row)
    }

    async fn get_bill(&self, tenant_id: &Id, id: &Id) -> Result<Option<Bill>> {
        let row = sqlx::query(&format!(
            "SELECT {BILL_COLUMNS} FROM bills WHERE tenant_id = $1 AND id = $2"
        ))
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch bill")?;
        row.as_ref().map(bill_from_row).transpose()
    }

    async fn get_bill_for_job(&self, tenant_id: &Id, job_order_id: &Id) -> Result<Option<Bill>> {
        let row = sqlx::query(&format!(
            "SELECT {BILL_COLUMNS} FROM bills WHERE tenant_id = $1 AND job_order_id = $2"
        ))
        .bind(tenant_id)
        .bind(job_order_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch bill for job order")?;
        row.as_ref().map(bill_from_row).transpose()
    }

    async fn mark_bill_paid(
        &self,
        tenant_id: &Id,
        id: &Id,
        payment_method: Option<PaymentMethod>,
    ) -> AppResult<Bill> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(&format!(
            "SELECT {BILL_COLUMNS} FROM bills WHERE tenant_id = $1 AND id = $2 FOR UPDATE"
        ))
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        let mut bill = match row {
            Some(row) => bill_from_row(&row)?,
            None => return Err(AppError::not_found(format!("bill {}", id))),
        };
        if bill.payment_status == PaymentStatus::Paid {
            return Err(AppError::Conflict(format!(
                "bill {} is already paid",
                bill.bill_number
            )));
        }

        if let Some(method) = payment_method {
            bill.payment_method = method;
        }
        bill.payment_status = PaymentStatus::Paid;
        bill.paid_at = Some(Utc::now());
        sqlx::query(
            "UPDATE bills SET payment_method = $1, payment_status = $2, paid_at = $3 WHERE id = $4",
        )
        .bind(bill.payment_method.as_str())
        .bind(bill.payment_status.as_str())
        .bind(bill.paid_at)
        .bind(&bill.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(bill)
    }
}

impl Store for PostgresStore {}
