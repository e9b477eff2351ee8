use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;

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

/// In-process store. One mutex guards every table and each operation holds
/// it from its first read to its last write, so workflows are all-or-nothing
/// exactly like their Postgres transactions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug, Default)]
struct Tables {
    tenants: HashMap<Id, Tenant>,
    branches: Vec<Branch>,
    users: Vec<User>,
    sessions: HashMap<String, Session>,
    categories: Vec<Category>,
    products: Vec<Product>,
    customers: Vec<Customer>,
    job_orders: Vec<JobOrder>,
    job_order_items: Vec<JobOrderItem>,
    stock_transactions: Vec<StockTransaction>,
    bills: Vec<Bill>,
}

/// A job order and its customer, validated but not yet written.
struct PreparedJob {
    customer: Customer,
    customer_is_new: bool,
    job_order: JobOrder,
}

impl Tables {
    fn username_taken(&self, username: &str) -> bool {
        self.users.iter().any(|u| u.username == username)
    }

    fn product(&self, tenant_id: &str, id: &str) -> Option<&Product> {
        self.products
            .iter()
            .find(|p| p.tenant_id == tenant_id && p.id == id)
    }

    fn products_for(&self, tenant_id: &str, ids: &[Id]) -> Vec<Product> {
        self.products
            .iter()
            .filter(|p| p.tenant_id == tenant_id && ids.contains(&p.id))
            .cloned()
            .collect()
    }

    fn put_product(&mut self, product: Product) {
        match self.products.iter_mut().find(|p| p.id == product.id) {
            Some(slot) => *slot = product,
            None => self.products.push(product),
        }
    }

    fn job_order(&self, tenant_id: &str, id: &str) -> AppResult<JobOrder> {
        self.job_orders
            .iter()
            .find(|j| j.tenant_id == tenant_id && j.id == id)
            .cloned()
            .ok_or_else(|| AppError::not_found(format!("job order {}", id)))
    }

    fn put_job_order(&mut self, job_order: JobOrder) {
        match self.job_orders.iter_mut().find(|j| j.id == job_order.id) {
            Some(slot) => *slot = job_order,
            None => self.job_orders.push(job_order),
        }
    }

    fn items_for(&self, job_order_id: &str) -> Vec<JobOrderItem> {
        self.job_order_items
            .iter()
            .filter(|i| i.job_order_id == job_order_id)
            .cloned()
            .collect()
    }

    fn put_item(&mut self, item: JobOrderItem) {
        match self.job_order_items.iter_mut().find(|i| i.id == item.id) {
            Some(slot) => *slot = item,
            None => self.job_order_items.push(item),
        }
    }

    fn apply_stock(&mut self, products: Vec<Product>, transactions: Vec<StockTransaction>) {
        for product in products {
            self.put_product(product);
        }
        self.stock_transactions.extend(transactions);
    }

    fn customer_by_plate(&self, tenant_id: &str, plate: &str) -> Option<&Customer> {
        self.customers
            .iter()
            .find(|c| c.tenant_id == tenant_id && c.plate_number == plate)
    }

    fn prepare_customer(&self, tenant_id: &Id, new: NewCustomer) -> AppResult<(Customer, bool)> {
        new.validate()?;
        let candidate = new.into_customer(tenant_id.clone());
        match self.customer_by_plate(tenant_id, &candidate.plate_number) {
            Some(existing) => Ok((existing.clone(), false)),
            None => Ok((candidate, true)),
        }
    }

    fn prepare_job(
        &self,
        actor: &SessionUser,
        branch_id: &Id,
        customer: NewCustomer,
        description: Option<String>,
    ) -> AppResult<PreparedJob> {
        let branch_ok = self
            .branches
            .iter()
            .any(|b| b.tenant_id == actor.tenant_id && &b.id == branch_id && b.is_active);
        if !branch_ok {
            return Err(AppError::not_found(format!("branch {}", branch_id)));
        }

        let (customer, customer_is_new) = self.prepare_customer(&actor.tenant_id, customer)?;
        let job_number = next_code(
            JOB_NUMBER_PREFIX,
            JOB_NUMBER_WIDTH,
            self.job_orders
                .iter()
                .filter(|j| j.tenant_id == actor.tenant_id)
                .map(|j| j.job_number.as_str()),
        );
        let job_order = JobOrder::open(
            actor.tenant_id.clone(),
            branch_id.clone(),
            job_number,
            customer.id.clone(),
            description,
            actor.user_id.clone(),
        );
        Ok(PreparedJob {
            customer,
            customer_is_new,
            job_order,
        })
    }

    fn commit_job(&mut self, prepared: PreparedJob) -> JobOrder {
        if prepared.customer_is_new {
            self.customers.push(prepared.customer);
        }
        self.job_orders.push(prepared.job_order.clone());
        prepared.job_order
    }
}

#[async_trait::async_trait]
impl TenantStore for MemoryStore {
    async fn register_tenant(&self, tenant: Tenant, branch: Branch, admin: User) -> AppResult<()> {
        let mut tables = self.tables.lock();
        if tables.username_taken(&admin.username) {
            return Err(AppError::Conflict(format!(
                "username '{}' is already taken",
                admin.username
            )));
        }
        tables.tenants.insert(tenant.id.clone(), tenant);
        tables.branches.push(branch);
        tables.users.push(admin);
        Ok(())
    }

    async fn list_branches(&self, tenant_id: &Id) -> Result<Vec<Branch>> {
        let tables = self.tables.lock();
        Ok(tables
            .branches
            .iter()
            .filter(|b| &b.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn get_branch(&self, tenant_id: &Id, id: &Id) -> Result<Option<Branch>> {
        let tables = self.tables.lock();
        Ok(tables
            .branches
            .iter()
            .find(|b| &b.tenant_id == tenant_id && &b.id == id)
            .cloned())
    }

    async fn insert_branch(&self, branch: Branch) -> Result<()> {
        self.tables.lock().branches.push(branch);
        Ok(())
    }
}

#[async_trait::async_trait]
impl UserStore for MemoryStore {
    async fn get_user(&self, id: &Id) -> Result<Option<User>> {
        Ok(self.tables.lock().users.iter().find(|u| &u.id == id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let tables = self.tables.lock();
        Ok(tables.users.iter().find(|u| u.username == username).cloned())
    }

    async fn list_users(&self, tenant_id: &Id) -> Result<Vec<User>> {
        let tables = self.tables.lock();
        let mut users: Vec<User> = tables
            .users
            .iter()
            .filter(|u| &u.tenant_id == tenant_id)
            .cloned()
            .collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    async fn insert_user(&self, user: User) -> AppResult<()> {
        let mut tables = self.tables.lock();
        if tables.username_taken(&user.username) {
            return Err(AppError::Conflict(format!(
                "username '{}' is already taken",
                user.username
            )));
        }
        tables.users.push(user);
        Ok(())
    }

    async fn update_user(&self, user: User) -> Result<()> {
        let mut tables = self.tables.lock();
        if let Some(slot) = tables.users.iter_mut().find(|u| u.id == user.id) {
            *slot = user;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl SessionStore for MemoryStore {
    async fn insert_session(&self, session: Session) -> Result<()> {
        self.tables
            .lock()
            .sessions
            .insert(session.token_hash.clone(), session);
        Ok(())
    }

    async fn get_session(&self, token_hash: &str) -> Result<Option<Session>> {
        Ok(self.tables.lock().sessions.get(token_hash).cloned())
    }

    async fn delete_session(&self, token_hash: &str) -> Result<bool> {
        Ok(self.tables.lock().sessions.remove(token_hash).is_some())
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut tables = self.tables.lock();
        let before = tables.sessions.len();
        tables.sessions.retain(|_, s| !s.is_expired(now));
        Ok((before - tables.sessions.len()) as u64)
    }
}

#[async_trait::async_trait]
impl CatalogStore for MemoryStore {
    async fn list_categories(&self, tenant_id: &Id) -> Result<Vec<Category>> {
        let tables = self.tables.lock();
        let mut categories: Vec<Category> = tables
            .categories
            .iter()
            .filter(|c| &c.tenant_id == tenant_id)
            .cloned()
            .collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn get_category(&self, tenant_id: &Id, id: &Id) -> Result<Option<Category>> {
        let tables = self.tables.lock();
        Ok(tables
            .categories
            .iter()
            .find(|c| &c.tenant_id == tenant_id && &c.id == id)
            .cloned())
    }

    async fn insert_category(&self, category: Category) -> AppResult<()> {
        let mut tables = self.tables.lock();
        let taken = tables
            .categories
            .iter()
            .any(|c| c.tenant_id == category.tenant_id && c.code == category.code);
        if taken {
            return Err(AppError::Conflict(format!(
                "category code '{}' is already used",
                category.code
            )));
        }
        tables.categories.push(category);
        Ok(())
    }

    async fn list_products(&self, tenant_id: &Id, filter: &ProductFilter) -> Result<Vec<Product>> {
        let tables = self.tables.lock();
        let mut products: Vec<Product> = tables
            .products
            .iter()
            .filter(|p| &p.tenant_id == tenant_id && filter.matches(p))
            .cloned()
            .collect();
        products.sort_by(|a, b| a.sku.cmp(&b.sku));
        Ok(products)
    }

    async fn get_product(&self, tenant_id: &Id, id: &Id) -> Result<Option<Product>> {
        Ok(self.tables.lock().product(tenant_id, id).cloned())
    }

    async fn create_product(
        &self,
        actor: &SessionUser,
        mut product: Product,
        sku_prefix: &str,
        opening_stock: i32,
    ) -> AppResult<Product> {
        let mut tables = self.tables.lock();
        let tenant_skus: Vec<&str> = tables
            .products
            .iter()
            .filter(|p| p.tenant_id == product.tenant_id)
            .map(|p| p.sku.as_str())
            .collect();

        if product.sku.is_empty() {
            product.sku = next_code(sku_prefix, SKU_WIDTH, &tenant_skus);
        }
        if tenant_skus.contains(&product.sku.as_str()) {
            return Err(AppError::Conflict(format!(
                "sku '{}' is already used",
                product.sku
            )));
        }

        match plan_opening_stock(actor, &product, opening_stock)? {
            Some(plan) => {
                let created = plan.product.clone();
                tables.apply_stock(vec![plan.product], vec![plan.transaction]);
                Ok(created)
            }
            None => {
                tables.products.push(product.clone());
                Ok(product)
            }
        }
    }

    async fn update_product(&self, product: Product) -> Result<()> {
        let mut tables = self.tables.lock();
        if let Some(slot) = tables.products.iter_mut().find(|p| p.id == product.id) {
            let stock_quantity = slot.stock_quantity;
            *slot = Product {
                stock_quantity,
                ..product
            };
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl CustomerStore for MemoryStore {
    async fn list_customers(
        &self,
        tenant_id: &Id,
        filter: &CustomerFilter,
    ) -> Result<Vec<Customer>> {
        let tables = self.tables.lock();
        let mut customers: Vec<Customer> = tables
            .customers
            .iter()
            .filter(|c| &c.tenant_id == tenant_id && filter.matches(c))
            .cloned()
            .collect();
        customers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(customers)
    }

    async fn get_customer(&self, tenant_id: &Id, id: &Id) -> Result<Option<Customer>> {
        let tables = self.tables.lock();
        Ok(tables
            .customers
            .iter()
            .find(|c| &c.tenant_id == tenant_id && &c.id == id)
            .cloned())
    }

    async fn find_or_create_customer(
        &self,
        tenant_id: &Id,
        customer: NewCustomer,
    ) -> AppResult<(Customer, bool)> {
        let mut tables = self.tables.lock();
        let (customer, created) = tables.prepare_customer(tenant_id, customer)?;
        if created {
            tables.customers.push(customer.clone());
        }
        Ok((customer, created))
    }

    async fn update_customer(&self, customer: Customer) -> AppResult<()> {
        let mut tables = self.tables.lock();
        let clash = tables.customers.iter().any(|c| {
            c.tenant_id == customer.tenant_id
                && c.plate_number == customer.plate_number
                && c.id != customer.id
        });
        if clash {
            return Err(AppError::Conflict(format!(
                "plate '{}' belongs to another customer",
                customer.plate_number
            )));
        }
        if let Some(slot) = tables.customers.iter_mut().find(|c| c.id == customer.id) {
            *slot = customer;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl JobOrderStore for MemoryStore {
    async fn list_job_orders(
        &self,
        tenant_id: &Id,
        filter: &JobOrderFilter,
    ) -> Result<Vec<JobOrder>> {
        let tables = self.tables.lock();
        let mut jobs: Vec<JobOrder> = tables
            .job_orders
            .iter()
            .filter(|j| &j.tenant_id == tenant_id && filter.matches(j))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.job_number.cmp(&a.job_number)));
        Ok(jobs)
    }

    async fn get_job_order(&self, tenant_id: &Id, id: &Id) -> Result<Option<JobOrder>> {
        let tables = self.tables.lock();
        Ok(tables.job_order(tenant_id, id).ok())
    }

    async fn list_job_order_items(&self, job_order_id: &Id) -> Result<Vec<JobOrderItem>> {
        Ok(self.tables.lock().items_for(job_order_id))
    }

    async fn open_job_order(
        &self,
        actor: &SessionUser,
        branch_id: &Id,
        customer: NewCustomer,
        description: Option<String>,
    ) -> AppResult<JobOrder> {
        let mut tables = self.tables.lock();
        let prepared = tables.prepare_job(actor, branch_id, customer, description)?;
        Ok(tables.commit_job(prepared))
    }

    async fn update_job_details(
        &self,
        actor: &SessionUser,
        job_order_id: &Id,
        update: &JobOrderUpdate,
    ) -> AppResult<JobOrder> {
        update.validate()?;
        let mut tables = self.tables.lock();
        let mut job = tables.job_order(&actor.tenant_id, job_order_id)?;
        actor.require_branch(&job.branch_id)?;
        update.apply_to(&mut job)?;
        tables.put_job_order(job.clone());
        Ok(job)
    }
}

#[async_trait::async_trait]
impl LedgerStore for MemoryStore {
    async fn stock_in(
        &self,
        actor: &SessionUser,
        lines: &[StockLine],
        note: Option<&str>,
    ) -> AppResult<Vec<StockTransaction>> {
        let mut tables = self.tables.lock();
        let products = tables.products_for(&actor.tenant_id, &product_ids(lines));
        let plan = plan_stock_in(actor, &products, lines, note)?;
        let transactions = plan.transactions.clone();
        tables.apply_stock(plan.products, plan.transactions);
        Ok(transactions)
    }

    async fn adjust_stock(
        &self,
        actor: &SessionUser,
        product_id: &Id,
        counted_quantity: i32,
        note: Option<&str>,
    ) -> AppResult<StockTransaction> {
        let mut tables = self.tables.lock();
        let product = tables
            .product(&actor.tenant_id, product_id)
            .cloned()
            .ok_or_else(|| AppError::not_found(format!("product {}", product_id)))?;
        let plan = plan_adjustment(actor, &product, counted_quantity, note)?;
        let transaction = plan.transaction.clone();
        tables.apply_stock(vec![plan.product], vec![plan.transaction]);
        Ok(transaction)
    }

    async fn stock_out(
        &self,
        actor: &SessionUser,
        target: StockOutTarget,
        lines: &[StockLine],
    ) -> AppResult<StockOutReceipt> {
        let mut tables = self.tables.lock();

        let (job, prepared) = match target {
            StockOutTarget::JobOrder(id) => (tables.job_order(&actor.tenant_id, &id)?, None),
            StockOutTarget::WalkIn(walk_in) => {
                let prepared = tables.prepare_job(
                    actor,
                    &walk_in.branch_id,
                    walk_in.customer,
                    walk_in.description,
                )?;
                (prepared.job_order.clone(), Some(prepared))
            }
        };

        let products = tables.products_for(&actor.tenant_id, &product_ids(lines));
        let existing = tables.items_for(&job.id);
        let plan = plan_stock_out(actor, &job, &products, &existing, lines)?;

        if let Some(prepared) = prepared {
            tables.commit_job(prepared);
        }
        for change in plan.item_changes {
            tables.put_item(change.item);
        }
        let transactions = plan.transactions.clone();
        tables.apply_stock(plan.products, plan.transactions);
        tables.put_job_order(plan.job_order.clone());

        Ok(StockOutReceipt {
            items: tables.items_for(&plan.job_order.id),
            job_order: plan.job_order,
            transactions,
        })
    }

    async fn remove_job_item(
        &self,
        actor: &SessionUser,
        job_order_id: &Id,
        item_id: &Id,
    ) -> AppResult<StockTransaction> {
        let mut tables = self.tables.lock();
        let job = tables.job_order(&actor.tenant_id, job_order_id)?;
        let item = tables
            .job_order_items
            .iter()
            .find(|i| &i.id == item_id && &i.job_order_id == job_order_id)
            .cloned()
            .ok_or_else(|| AppError::not_found(format!("item {}", item_id)))?;
        let product = tables
            .product(&actor.tenant_id, &item.product_id)
            .cloned()
            .ok_or_else(|| AppError::not_found(format!("product {}", item.product_id)))?;

        let plan = plan_item_removal(actor, &job, &item, &product)?;
        tables
            .job_order_items
            .retain(|i| i.id != plan.removed_item_id);
        let transaction = plan.transaction.clone();
        tables.apply_stock(vec![plan.product], vec![plan.transaction]);
        Ok(transaction)
    }

    async fn complete_job_order(
        &self,
        actor: &SessionUser,
        job_order_id: &Id,
        request: &CompletionRequest,
        vat_rate: Decimal,
    ) -> AppResult<Bill> {
        let mut tables = self.tables.lock();
        let job = tables.job_order(&actor.tenant_id, job_order_id)?;
        let items = tables.items_for(job_order_id);
        let already_billed = tables.bills.iter().any(|b| &b.job_order_id == job_order_id);
        let bill_number = next_code(
            BILL_NUMBER_PREFIX,
            BILL_NUMBER_WIDTH,
            tables
                .bills
                .iter()
                .filter(|b| b.tenant_id == actor.tenant_id)
                .map(|b| b.bill_number.as_str()),
        );

        let plan = plan_completion(
            actor,
            &job,
            &items,
            request,
            vat_rate,
            bill_number,
            already_billed,
        )?;
        tables.put_job_order(plan.job_order);
        tables.bills.push(plan.bill.clone());
        Ok(plan.bill)
    }

    async fn cancel_job_order(
        &self,
        actor: &SessionUser,
        job_order_id: &Id,
    ) -> AppResult<JobOrder> {
        let mut tables = self.tables.lock();
        let job = tables.job_order(&actor.tenant_id, job_order_id)?;
        let items = tables.items_for(job_order_id);
        let ids: Vec<Id> = items.iter().map(|i| i.product_id.clone()).collect();
        let products = tables.products_for(&actor.tenant_id, &ids);

        let plan = plan_cancellation(actor, &job, &items, &products)?;
        tables
            .job_order_items
            .retain(|i| !plan.removed_item_ids.contains(&i.id));
        tables.apply_stock(plan.products, plan.transactions);
        tables.put_job_order(plan.job_order.clone());
        Ok(plan.job_order)
    }

    async fn list_stock_transactions(
        &self,
        tenant_id: &Id,
        filter: &StockTransactionFilter,
    ) -> Result<Vec<StockTransaction>> {
        let tables = self.tables.lock();
        Ok(tables
            .stock_transactions
            .iter()
            .filter(|t| &t.tenant_id == tenant_id && filter.matches(t))
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl BillStore for MemoryStore {
    async fn list_bills(&self, tenant_id: &Id, filter: &BillFilter) -> Result<Vec<Bill>> {
        let tables = self.tables.lock();
        let mut bills: Vec<Bill> = tables
            .bills
            .iter()
            .filter(|b| &b.tenant_id == tenant_id && filter.matches(b))
            .cloned()
            .collect();
        bills.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bills)
    }

    async fn get_bill(&self, tenant_id: &Id, id: &Id) -> Result<Option<Bill>> {
        let tables = self.tables.lock();
        Ok(tables
            .bills
            .iter()
            .find(|b| &b.tenant_id == tenant_id && &b.id == id)
            .cloned())
    }

    async fn get_bill_for_job(&self, tenant_id: &Id, job_order_id: &Id) -> Result<Option<Bill>> {
        let tables = self.tables.lock();
        Ok(tables
            .bills
            .iter()
            .find(|b| &b.tenant_id == tenant_id && &b.job_order_id == job_order_id)
            .cloned())
    }

    async fn mark_bill_paid(
        &self,
        tenant_id: &Id,
        id: &Id,
        payment_method: Option<PaymentMethod>,
    ) -> AppResult<Bill> {
        let mut tables = self.tables.lock();
        let bill = tables
            .bills
            .iter_mut()
            .find(|b| &b.tenant_id == tenant_id && &b.id == id)
            .ok_or_else(|| AppError::not_found(format!("bill {}", id)))?;
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
        Ok(bill.clone())
    }
}

impl Store for MemoryStore {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::default_vat_rate;
    use crate::model::{JobStatus, Role, WalkIn};

    struct Shop {
        store: MemoryStore,
        admin: SessionUser,
        branch: Branch,
    }

    async fn shop() -> Shop {
        let store = MemoryStore::new();
        let tenant = Tenant::new("Rivera Auto".to_string());
        let branch = Branch::new(tenant.id.clone(), "Main".to_string(), None);
        let admin = User::new(
            tenant.id.clone(),
            Some(branch.id.clone()),
            "owner",
            None,
            "salt$hash".to_string(),
            Role::Admin,
        );
        let actor = SessionUser::from_user(&admin);
        store
            .register_tenant(tenant, branch.clone(), admin)
            .await
            .unwrap();
        Shop {
            store,
            admin: actor,
            branch,
        }
    }

    async fn add_product(shop: &Shop, name: &str, price: i64, opening: i32) -> Product {
        let product = crate::model::NewProduct {
            branch_id: None,
            category_id: None,
            sku: None,
            name: name.to_string(),
            description: None,
            unit: None,
            cost_price: Decimal::new(price / 2, 0),
            selling_price: Decimal::new(price, 0),
            reorder_level: 2,
            opening_stock: opening,
        }
        .into_product(
            shop.admin.tenant_id.clone(),
            shop.branch.id.clone(),
            String::new(),
        );
        shop.store
            .create_product(&shop.admin, product, "SKU", opening)
            .await
            .unwrap()
    }

    fn walk_in(shop: &Shop, plate: &str) -> StockOutTarget {
        StockOutTarget::WalkIn(WalkIn {
            branch_id: shop.branch.id.clone(),
            customer: NewCustomer {
                plate_number: plate.to_string(),
                name: "Rey Santos".to_string(),
                phone: None,
                vehicle_make: Some("Toyota".to_string()),
                vehicle_model: None,
            },
            description: Some("PMS".to_string()),
        })
    }

    fn line(product: &Product, quantity: i32) -> StockLine {
        StockLine {
            product_id: product.id.clone(),
            quantity,
            unit_price: None,
        }
    }

    /// Ledger pairing: the counter equals the sum of its deltas and the last
    /// row's balance.
    async fn assert_ledger_consistent(shop: &Shop, product_id: &Id) {
        let product = shop
            .store
            .get_product(&shop.admin.tenant_id, product_id)
            .await
            .unwrap()
            .unwrap();
        let rows = shop
            .store
            .list_stock_transactions(
                &shop.admin.tenant_id,
                &StockTransactionFilter {
                    product_id: Some(product_id.clone()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let sum: i32 = rows.iter().map(|r| r.quantity).sum();
        assert_eq!(sum, product.stock_quantity);
        assert_eq!(
            rows.last().map(|r| r.balance_after).unwrap_or(0),
            product.stock_quantity
        );
    }

    #[tokio::test]
    async fn test_create_product_numbers_sku_and_books_opening_stock() {
        let shop = shop().await;
        let first = add_product(&shop, "Oil filter", 350, 10).await;
        let second = add_product(&shop, "Brake pad", 1200, 0).await;

        assert_eq!(first.sku, "SKU-00001");
        assert_eq!(second.sku, "SKU-00002");
        assert_eq!(first.stock_quantity, 10);
        assert_ledger_consistent(&shop, &first.id).await;

        let rows = shop
            .store
            .list_stock_transactions(&shop.admin.tenant_id, &StockTransactionFilter::default())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1, "zero opening stock writes no ledger row");
    }

    #[tokio::test]
    async fn test_duplicate_manual_sku_conflicts() {
        let shop = shop().await;
        let existing = add_product(&shop, "Oil filter", 350, 0).await;
        let mut copy = existing.clone();
        copy.id = crate::model::generate_id();
        let result = shop.store.create_product(&shop.admin, copy, "SKU", 0).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_manual_sku_with_huge_suffix_does_not_break_numbering() {
        let shop = shop().await;
        let mut manual = add_product(&shop, "Oil filter", 350, 0).await;
        manual.id = crate::model::generate_id();
        manual.sku = "SKU-18446744073709551615".to_string();
        shop.store
            .create_product(&shop.admin, manual, "SKU", 0)
            .await
            .unwrap();

        let next = add_product(&shop, "Air filter", 300, 0).await;
        assert_eq!(next.sku, "SKU-00002");
    }

    #[tokio::test]
    async fn test_job_details_update_cannot_reopen_a_billed_job() {
        let shop = shop().await;
        let oil = add_product(&shop, "Engine oil", 450, 8).await;
        let receipt = shop
            .store
            .stock_out(&shop.admin, walk_in(&shop, "LATE 01"), &[line(&oil, 1)])
            .await
            .unwrap();
        let job_id = receipt.job_order.id.clone();

        let request = CompletionRequest {
            labor_cost: None,
            payment_method: PaymentMethod::Cash,
            payment_status: None,
        };
        shop.store
            .complete_job_order(&shop.admin, &job_id, &request, default_vat_rate())
            .await
            .unwrap();

        // An edit that was read before completion arrives afterwards.
        let update = JobOrderUpdate {
            description: Some("late edit".to_string()),
            labor_cost: Some(Decimal::new(100, 0)),
        };
        let result = shop
            .store
            .update_job_details(&shop.admin, &job_id, &update)
            .await;
        assert!(matches!(result, Err(AppError::InvalidJobState { .. })));

        let job = shop
            .store
            .get_job_order(&shop.admin.tenant_id, &job_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.completed_at.is_some());
        assert_eq!(job.description.as_deref(), Some("PMS"));

        let more = shop
            .store
            .stock_out(&shop.admin, StockOutTarget::JobOrder(job_id), &[line(&oil, 1)])
            .await;
        assert!(matches!(more, Err(AppError::InvalidJobState { .. })));
    }

    #[tokio::test]
    async fn test_job_details_update_writes_only_details() {
        let shop = shop().await;
        let oil = add_product(&shop, "Engine oil", 450, 8).await;
        let receipt = shop
            .store
            .stock_out(&shop.admin, walk_in(&shop, "EDIT 02"), &[line(&oil, 1)])
            .await
            .unwrap();

        let update = JobOrderUpdate {
            description: Some("Change oil and filter".to_string()),
            labor_cost: Some(Decimal::new(25000, 2)),
        };
        let job = shop
            .store
            .update_job_details(&shop.admin, &receipt.job_order.id, &update)
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::InProgress);
        assert_eq!(job.labor_cost, Decimal::new(25000, 2));
        assert_eq!(job.job_number, receipt.job_order.job_number);
    }

    #[tokio::test]
    async fn test_walk_in_stock_out_creates_customer_and_job() {
        let shop = shop().await;
        let oil = add_product(&shop, "Engine oil", 450, 8).await;

        let receipt = shop
            .store
            .stock_out(&shop.admin, walk_in(&shop, "abc 1234"), &[line(&oil, 3)])
            .await
            .unwrap();

        assert_eq!(receipt.job_order.status, JobStatus::InProgress);
        assert_eq!(receipt.job_order.job_number, "JO-000001");
        assert_eq!(receipt.items.len(), 1);
        assert_eq!(receipt.items[0].unit_price, Decimal::new(450, 0));
        assert_eq!(receipt.transactions[0].balance_after, 5);

        let customers = shop
            .store
            .list_customers(&shop.admin.tenant_id, &CustomerFilter::default())
            .await
            .unwrap();
        assert_eq!(customers.len(), 1);
        assert_eq!(customers[0].plate_number, "ABC1234");

        // Same plate again reuses the customer but opens a new job.
        let again = shop
            .store
            .stock_out(&shop.admin, walk_in(&shop, "ABC-1234"), &[line(&oil, 1)])
            .await
            .unwrap();
        assert_eq!(again.job_order.job_number, "JO-000002");
        assert_eq!(again.job_order.customer_id, customers[0].id);
        assert_ledger_consistent(&shop, &oil.id).await;
    }

    #[tokio::test]
    async fn test_failed_walk_in_leaves_nothing_behind() {
        let shop = shop().await;
        let oil = add_product(&shop, "Engine oil", 450, 2).await;
        let pads = add_product(&shop, "Brake pad", 1200, 5).await;

        let result = shop
            .store
            .stock_out(
                &shop.admin,
                walk_in(&shop, "XYZ 999"),
                &[line(&pads, 1), line(&oil, 3)],
            )
            .await;
        assert!(matches!(result, Err(AppError::InsufficientStock { .. })));

        let tenant = &shop.admin.tenant_id;
        assert!(shop
            .store
            .list_customers(tenant, &CustomerFilter::default())
            .await
            .unwrap()
            .is_empty());
        assert!(shop
            .store
            .list_job_orders(tenant, &JobOrderFilter::default())
            .await
            .unwrap()
            .is_empty());
        let pads_now = shop.store.get_product(tenant, &pads.id).await.unwrap().unwrap();
        assert_eq!(pads_now.stock_quantity, 5);
        assert_ledger_consistent(&shop, &pads.id).await;
    }

    #[tokio::test]
    async fn test_repeat_issue_merges_item() {
        let shop = shop().await;
        let oil = add_product(&shop, "Engine oil", 450, 10).await;
        let first = shop
            .store
            .stock_out(&shop.admin, walk_in(&shop, "AAA111"), &[line(&oil, 2)])
            .await
            .unwrap();
        let job_id = first.job_order.id.clone();

        let second = shop
            .store
            .stock_out(
                &shop.admin,
                StockOutTarget::JobOrder(job_id.clone()),
                &[line(&oil, 3)],
            )
            .await
            .unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0].id, first.items[0].id);
        assert_eq!(second.items[0].quantity, 5);
        assert_ledger_consistent(&shop, &oil.id).await;
    }

    #[tokio::test]
    async fn test_remove_item_restores_stock() {
        let shop = shop().await;
        let oil = add_product(&shop, "Engine oil", 450, 10).await;
        let receipt = shop
            .store
            .stock_out(&shop.admin, walk_in(&shop, "AAA111"), &[line(&oil, 4)])
            .await
            .unwrap();

        let row = shop
            .store
            .remove_job_item(&shop.admin, &receipt.job_order.id, &receipt.items[0].id)
            .await
            .unwrap();
        assert_eq!(row.quantity, 4);
        assert_eq!(row.balance_after, 10);
        assert!(shop
            .store
            .list_job_order_items(&receipt.job_order.id)
            .await
            .unwrap()
            .is_empty());
        assert_ledger_consistent(&shop, &oil.id).await;
    }

    #[tokio::test]
    async fn test_complete_then_refuse_further_changes() {
        let shop = shop().await;
        let oil = add_product(&shop, "Engine oil", 450, 10).await;
        let receipt = shop
            .store
            .stock_out(&shop.admin, walk_in(&shop, "AAA111"), &[line(&oil, 2)])
            .await
            .unwrap();
        let job_id = receipt.job_order.id.clone();

        let request = CompletionRequest {
            labor_cost: Some(Decimal::new(300, 0)),
            payment_method: PaymentMethod::Cash,
            payment_status: None,
        };
        let bill = shop
            .store
            .complete_job_order(&shop.admin, &job_id, &request, default_vat_rate())
            .await
            .unwrap();
        assert_eq!(bill.bill_number, "BILL-000001");
        assert_eq!(bill.subtotal, Decimal::new(900, 0));
        assert_eq!(bill.grand_total, Decimal::new(134400, 2));
        assert_eq!(bill.payment_status, PaymentStatus::Unpaid);

        let job = shop
            .store
            .get_job_order(&shop.admin.tenant_id, &job_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.status, JobStatus::Completed);

        let again = shop
            .store
            .stock_out(&shop.admin, StockOutTarget::JobOrder(job_id.clone()), &[line(&oil, 1)])
            .await;
        assert!(matches!(again, Err(AppError::InvalidJobState { .. })));
        assert!(shop
            .store
            .complete_job_order(&shop.admin, &job_id, &request, default_vat_rate())
            .await
            .is_err());

        let paid = shop
            .store
            .mark_bill_paid(&shop.admin.tenant_id, &bill.id, Some(PaymentMethod::Card))
            .await
            .unwrap();
        assert_eq!(paid.payment_status, PaymentStatus::Paid);
        assert_eq!(paid.payment_method, PaymentMethod::Card);
        assert_eq!(paid.grand_total, bill.grand_total);
        assert!(matches!(
            shop.store
                .mark_bill_paid(&shop.admin.tenant_id, &bill.id, None)
                .await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_returns_stock() {
        let shop = shop().await;
        let oil = add_product(&shop, "Engine oil", 450, 10).await;
        let pads = add_product(&shop, "Brake pad", 1200, 4).await;
        let receipt = shop
            .store
            .stock_out(
                &shop.admin,
                walk_in(&shop, "AAA111"),
                &[line(&oil, 2), line(&pads, 4)],
            )
            .await
            .unwrap();

        let job = shop
            .store
            .cancel_job_order(&shop.admin, &receipt.job_order.id)
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);

        let tenant = &shop.admin.tenant_id;
        assert_eq!(
            shop.store.get_product(tenant, &oil.id).await.unwrap().unwrap().stock_quantity,
            10
        );
        assert_eq!(
            shop.store.get_product(tenant, &pads.id).await.unwrap().unwrap().stock_quantity,
            4
        );
        assert_ledger_consistent(&shop, &oil.id).await;
        assert_ledger_consistent(&shop, &pads.id).await;
    }

    #[tokio::test]
    async fn test_tenants_are_isolated() {
        let shop = shop().await;
        let oil = add_product(&shop, "Engine oil", 450, 10).await;
        let outsider = SessionUser::system("another-tenant".to_string());

        assert!(shop
            .store
            .get_product(&outsider.tenant_id, &oil.id)
            .await
            .unwrap()
            .is_none());
        let result = shop
            .store
            .stock_in(&outsider, &[line(&oil, 5)], None)
            .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_update_product_keeps_stock_counter() {
        let shop = shop().await;
        let oil = add_product(&shop, "Engine oil", 450, 10).await;
        let mut edited = oil.clone();
        edited.name = "Engine oil 1L".to_string();
        edited.stock_quantity = 999;
        shop.store.update_product(edited).await.unwrap();

        let stored = shop
            .store
            .get_product(&shop.admin.tenant_id, &oil.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.name, "Engine oil 1L");
        assert_eq!(stored.stock_quantity, 10);
    }

    #[tokio::test]
    async fn test_expired_sessions_are_purged() {
        let shop = shop().await;
        let now = Utc::now();
        for (hash, offset) in [("live", 1), ("dead", -1)] {
            shop.store
                .insert_session(Session {
                    token_hash: hash.to_string(),
                    user_id: shop.admin.user_id.clone(),
                    tenant_id: shop.admin.tenant_id.clone(),
                    created_at: now,
                    expires_at: now + chrono::Duration::hours(offset),
                })
                .await
                .unwrap();
        }
        assert_eq!(shop.store.delete_expired_sessions(now).await.unwrap(), 1);
        assert!(shop.store.get_session("live").await.unwrap().is_some());
        assert!(shop.store.get_session("dead").await.unwrap().is_none());
    }
}
