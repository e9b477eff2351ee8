use crate::error::AppResult;
use crate::model::{
    Bill, BillFilter, Branch, Category, CompletionRequest, Customer, CustomerFilter, Id, JobOrder,
    JobOrderFilter, JobOrderItem, JobOrderUpdate, NewCustomer, PaymentMethod, Product,
    ProductFilter, Session, SessionUser, StockLine, StockOutReceipt, StockOutTarget,
    StockTransaction, StockTransactionFilter, Tenant, User,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

#[async_trait::async_trait]
pub trait TenantStore: Send + Sync {
    /// Create a tenant with its first branch and admin user in one transaction.
    /// Fails with a conflict when the admin's username is taken.
    async fn register_tenant(&self, tenant: Tenant, branch: Branch, admin: User) -> AppResult<()>;
    async fn list_branches(&self, tenant_id: &Id) -> Result<Vec<Branch>>;
    async fn get_branch(&self, tenant_id: &Id, id: &Id) -> Result<Option<Branch>>;
    async fn insert_branch(&self, branch: Branch) -> Result<()>;
}

#[async_trait::async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, id: &Id) -> Result<Option<User>>;
    /// Usernames are unique across tenants so login needs no shop selector.
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>>;
    async fn list_users(&self, tenant_id: &Id) -> Result<Vec<User>>;
    async fn insert_user(&self, user: User) -> AppResult<()>;
    async fn update_user(&self, user: User) -> Result<()>;
}

#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert_session(&self, session: Session) -> Result<()>;
    async fn get_session(&self, token_hash: &str) -> Result<Option<Session>>;
    async fn delete_session(&self, token_hash: &str) -> Result<bool>;
    /// Drop every session that expired at or before `now`.
    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64>;
}

#[async_trait::async_trait]
pub trait CatalogStore: Send + Sync {
    async fn list_categories(&self, tenant_id: &Id) -> Result<Vec<Category>>;
    async fn get_category(&self, tenant_id: &Id, id: &Id) -> Result<Option<Category>>;
    async fn insert_category(&self, category: Category) -> AppResult<()>;
    async fn list_products(&self, tenant_id: &Id, filter: &ProductFilter) -> Result<Vec<Product>>;
    async fn get_product(&self, tenant_id: &Id, id: &Id) -> Result<Option<Product>>;
    /// Insert a product. An empty `sku` is numbered from `sku_prefix`; a
    /// positive `opening_stock` is booked as a PURCHASE row in the same
    /// transaction.
    async fn create_product(
        &self,
        actor: &SessionUser,
        product: Product,
        sku_prefix: &str,
        opening_stock: i32,
    ) -> AppResult<Product>;
    /// Persist catalog fields. The stock counter is left untouched.
    async fn update_product(&self, product: Product) -> Result<()>;
}

#[async_trait::async_trait]
pub trait CustomerStore: Send + Sync {
    async fn list_customers(&self, tenant_id: &Id, filter: &CustomerFilter)
        -> Result<Vec<Customer>>;
    async fn get_customer(&self, tenant_id: &Id, id: &Id) -> Result<Option<Customer>>;
    /// Returns the customer and whether it was newly created.
    async fn find_or_create_customer(
        &self,
        tenant_id: &Id,
        customer: NewCustomer,
    ) -> AppResult<(Customer, bool)>;
    async fn update_customer(&self, customer: Customer) -> AppResult<()>;
}

#[async_trait::async_trait]
pub trait JobOrderStore: Send + Sync {
    async fn list_job_orders(&self, tenant_id: &Id, filter: &JobOrderFilter)
        -> Result<Vec<JobOrder>>;
    async fn get_job_order(&self, tenant_id: &Id, id: &Id) -> Result<Option<JobOrder>>;
    async fn list_job_order_items(&self, job_order_id: &Id) -> Result<Vec<JobOrderItem>>;
    /// Find or create the customer by plate and open a numbered job order,
    /// all in one transaction.
    async fn open_job_order(
        &self,
        actor: &SessionUser,
        branch_id: &Id,
        customer: NewCustomer,
        description: Option<String>,
    ) -> AppResult<JobOrder>;
    /// Change description and labor on a job that is still open for work.
    /// The job row is locked for the check and the write, so a completion or
    /// cancellation that lands first wins and this call fails.
    async fn update_job_details(
        &self,
        actor: &SessionUser,
        job_order_id: &Id,
        update: &JobOrderUpdate,
    ) -> AppResult<JobOrder>;
}

/// Stock-ledger workflows. Each call is one transaction: either every row it
/// touches is written or none is.
#[async_trait::async_trait]
pub trait LedgerStore: Send + Sync {
    async fn stock_in(
        &self,
        actor: &SessionUser,
        lines: &[StockLine],
        note: Option<&str>,
    ) -> AppResult<Vec<StockTransaction>>;
    async fn adjust_stock(
        &self,
        actor: &SessionUser,
        product_id: &Id,
        counted_quantity: i32,
        note: Option<&str>,
    ) -> AppResult<StockTransaction>;
    async fn stock_out(
        &self,
        actor: &SessionUser,
        target: StockOutTarget,
        lines: &[StockLine],
    ) -> AppResult<StockOutReceipt>;
    async fn remove_job_item(
        &self,
        actor: &SessionUser,
        job_order_id: &Id,
        item_id: &Id,
    ) -> AppResult<StockTransaction>;
    async fn complete_job_order(
        &self,
        actor: &SessionUser,
        job_order_id: &Id,
        request: &CompletionRequest,
        vat_rate: Decimal,
    ) -> AppResult<Bill>;
    async fn cancel_job_order(&self, actor: &SessionUser, job_order_id: &Id)
        -> AppResult<JobOrder>;
    async fn list_stock_transactions(
        &self,
        tenant_id: &Id,
        filter: &StockTransactionFilter,
    ) -> Result<Vec<StockTransaction>>;
}

#[async_trait::async_trait]
pub trait BillStore: Send + Sync {
    async fn list_bills(&self, tenant_id: &Id, filter: &BillFilter) -> Result<Vec<Bill>>;
    async fn get_bill(&self, tenant_id: &Id, id: &Id) -> Result<Option<Bill>>;
    async fn get_bill_for_job(&self, tenant_id: &Id, job_order_id: &Id) -> Result<Option<Bill>>;
    /// UNPAID -> PAID. Paying twice is a conflict.
    async fn mark_bill_paid(
        &self,
        tenant_id: &Id,
        id: &Id,
        payment_method: Option<PaymentMethod>,
    ) -> AppResult<Bill>;
}

pub trait Store:
    TenantStore
    + UserStore
    + SessionStore
    + CatalogStore
    + CustomerStore
    + JobOrderStore
    + LedgerStore
    + BillStore
    + Send
    + Sync
{
}
