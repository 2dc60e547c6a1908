use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        auth::{LoginRequest, LoginResponse, RegisterRequest},
        orders::{OrderList, PurchaseRequest},
        products::{InventoryAdjustRequest, ProductList, ProductUpsertRequest},
    },
    models::{Order, Product, Role, User},
    response::{ApiResponse, Meta},
    routes::{admin, auth, health, orders, params, products, purchase},
    services::purchase::PurchaseReceipt,
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::login,
        auth::register,
        products::list_products,
        products::create_product,
        products::create_products_bulk,
        products::get_product,
        products::update_product,
        products::delete_product,
        purchase::purchase_product,
        orders::list_orders,
        orders::get_order,
        admin::create_admin,
        admin::list_all_orders,
        admin::adjust_inventory
    ),
    components(
        schemas(
            User,
            Role,
            Product,
            Order,
            PurchaseReceipt,
            PurchaseRequest,
            RegisterRequest,
            LoginRequest,
            LoginResponse,
            ProductUpsertRequest,
            InventoryAdjustRequest,
            ProductList,
            OrderList,
            params::Pagination,
            params::ProductQuery,
            params::OrderListQuery,
            health::HealthData,
            Meta,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<OrderList>,
            ApiResponse<PurchaseReceipt>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Products", description = "Catalog endpoints"),
        (name = "Purchase", description = "Flash-sale purchase endpoint"),
        (name = "Orders", description = "Order history endpoints"),
        (name = "Admin", description = "Admin endpoints"),
        (name = "Auth", description = "Authentication endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
