use crate::logic::hash_password;
use crate::model::{
    Branch, Category, CompletionRequest, NewCustomer, NewProduct, PaymentMethod, Product, Role,
    SessionUser, StockLine, StockOutTarget, Tenant, User, WalkIn,
};
use crate::store::traits::Store;
use anyhow::Result;
use rust_decimal::Decimal;

pub const DEMO_ADMIN_USERNAME: &str = "demo-admin";
pub const DEMO_ADMIN_PASSWORD: &str = "demo-password";

/// Load a demo shop: one branch, an admin, a small parts catalog with
/// opening stock, one job order in progress and one completed and billed.
/// Does nothing when the demo admin already exists. The billed job uses the
/// shop's configured `vat_rate`.
pub async fn load_seed_data<S: Store>(store: &S, vat_rate: Decimal) -> Result<()> {
    if store
        .find_user_by_username(DEMO_ADMIN_USERNAME)
        .await?
        .is_some()
    {
        log::info!("Seed data already present, skipping");
        return Ok(());
    }

    let tenant = Tenant::new("Demo Garage".to_string());
    let branch = Branch::new(
        tenant.id.clone(),
        "Main".to_string(),
        Some("1 Service Road".to_string()),
    );
    let admin = User::new(
        tenant.id.clone(),
        Some(branch.id.clone()),
        DEMO_ADMIN_USERNAME,
        Some("Demo Admin".to_string()),
        hash_password(DEMO_ADMIN_PASSWORD),
        Role::Admin,
    );
    let actor = SessionUser::from_user(&admin);
    store
        .register_tenant(tenant.clone(), branch.clone(), admin)
        .await?;

    let oils = create_category(store, &tenant, "Oils & Fluids", "OIL").await?;
    let brakes = create_category(store, &tenant, "Brakes", "BRK").await?;
    let filters = create_category(store, &tenant, "Filters", "FLT").await?;

    let engine_oil = create_product(
        store,
        &actor,
        &branch,
        Some(&oils),
        "Engine oil 4L",
        (1450, 1850),
        (12, 4),
    )
    .await?;
    let brake_fluid = create_product(
        store,
        &actor,
        &branch,
        Some(&oils),
        "Brake fluid DOT4",
        (280, 390),
        (20, 5),
    )
    .await?;
    let front_pads = create_product(
        store,
        &actor,
        &branch,
        Some(&brakes),
        "Front brake pads",
        (1100, 1650),
        (6, 2),
    )
    .await?;
    let oil_filter = create_product(
        store,
        &actor,
        &branch,
        Some(&filters),
        "Oil filter",
        (210, 350),
        (3, 5),
    )
    .await?;
    create_product(
        store,
        &actor,
        &branch,
        None,
        "Shop rags (pack)",
        (60, 90),
        (30, 10),
    )
    .await?;

    // A finished oil change, billed and unpaid.
    let receipt = store
        .stock_out(
            &actor,
            walk_in(&branch, "ABC 1234", "Rey Santos", "Toyota", "Vios"),
            &[line(&engine_oil, 1), line(&oil_filter, 1)],
        )
        .await?;
    store
        .complete_job_order(
            &actor,
            &receipt.job_order.id,
            &CompletionRequest {
                labor_cost: Some(Decimal::new(500, 0)),
                payment_method: PaymentMethod::Cash,
                payment_status: None,
            },
            vat_rate,
        )
        .await?;

    // A brake job still in the bay.
    store
        .stock_out(
            &actor,
            walk_in(&branch, "NCR-5678", "Lia Cruz", "Honda", "City"),
            &[line(&front_pads, 1), line(&brake_fluid, 1)],
        )
        .await?;

    log::info!(
        "Seeded tenant {} (login '{}' / '{}')",
        tenant.name,
        DEMO_ADMIN_USERNAME,
        DEMO_ADMIN_PASSWORD
    );
    Ok(())
}

async fn create_category<S: Store>(
    store: &S,
    tenant: &Tenant,
    name: &str,
    code: &str,
) -> Result<Category> {
    let category = Category::new(tenant.id.clone(), name.to_string(), code.to_string());
    store.insert_category(category.clone()).await?;
    Ok(category)
}

/// `(cost, price)` in whole currency units, `(opening_stock, reorder_level)`.
async fn create_product<S: Store>(
    store: &S,
    actor: &SessionUser,
    branch: &Branch,
    category: Option<&Category>,
    name: &str,
    (cost, price): (i64, i64),
    (opening_stock, reorder_level): (i32, i32),
) -> Result<Product> {
    let product = NewProduct {
        branch_id: None,
        category_id: category.map(|c| c.id.clone()),
        sku: None,
        name: name.to_string(),
        description: None,
        unit: None,
        cost_price: Decimal::new(cost, 0),
        selling_price: Decimal::new(price, 0),
        reorder_level,
        opening_stock,
    }
    .into_product(actor.tenant_id.clone(), branch.id.clone(), String::new());

    let prefix = category.map_or("SKU", |c| c.code.as_str());
    Ok(store
        .create_product(actor, product, prefix, opening_stock)
        .await?)
}

fn walk_in(branch: &Branch, plate: &str, name: &str, make: &str, model: &str) -> StockOutTarget {
    StockOutTarget::WalkIn(WalkIn {
        branch_id: branch.id.clone(),
        customer: NewCustomer {
            plate_number: plate.to_string(),
            name: name.to_string(),
            phone: None,
            vehicle_make: Some(make.to_string()),
            vehicle_model: Some(model.to_string()),
        },
        description: None,
    })
}

fn line(product: &Product, quantity: i32) -> StockLine {
    StockLine {
        product_id: product.id.clone(),
        quantity,
        unit_price: None,
    }
}
