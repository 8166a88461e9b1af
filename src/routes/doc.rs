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
        billing::{CheckoutResponse, CurrentSubscription, PlanList, SubscribeRequest, WebhookNotification},
        customers::{
            CreateCustomerRequest, CustomerAccount, CustomerList, RecordPaymentRequest,
            UpdateCustomerRequest,
        },
        imports::{AnalyzeResponse, ColumnMapping, ProcessReport, RowIssue, ValidationReport},
        products::{AdjustStockRequest, CreateProductRequest, ProductList, UpdateProductRequest},
        sales::{
            CreateSaleRequest, DiscountInput, LinkManualRequest, ManualProductList,
            ParseManualRequest, SaleItemInput, SaleList, SaleWithItems,
        },
    },
    models::{AccountEntry, Customer, ManualProduct, Plan, PlanPayment, Product, Sale, SaleItem},
    response::{ApiResponse, ErrorDetail, Meta},
    routes::{admin, customers, health, imports, params, products, sales, subscription},
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
        products::list_products,
        products::create_product,
        products::get_product,
        products::update_product,
        products::delete_product,
        products::adjust_stock,
        sales::create_sale,
        sales::list_sales,
        sales::get_sale,
        sales::cancel_sale,
        sales::parse_manual_product,
        sales::list_manual_products,
        sales::link_manual_product,
        sales::convert_manual_product,
        sales::ignore_manual_product,
        customers::create_customer,
        customers::list_customers,
        customers::get_customer,
        customers::update_customer,
        customers::delete_customer,
        customers::get_account,
        customers::record_payment,
        imports::analyze,
        imports::validate,
        imports::process,
        subscription::list_plans,
        subscription::current_subscription,
        subscription::subscription_checkout,
        subscription::mercadopago_webhook,
        admin::list_all_sales,
        admin::get_sale_admin,
        admin::list_low_stock,
        admin::sales_summary
    ),
    components(
        schemas(
            Product,
            Sale,
            SaleItem,
            ManualProduct,
            Customer,
            AccountEntry,
            Plan,
            PlanPayment,
            CreateProductRequest,
            UpdateProductRequest,
            AdjustStockRequest,
            ProductList,
            SaleItemInput,
            DiscountInput,
            CreateSaleRequest,
            SaleWithItems,
            SaleList,
            ParseManualRequest,
            LinkManualRequest,
            ManualProductList,
            CreateCustomerRequest,
            UpdateCustomerRequest,
            RecordPaymentRequest,
            CustomerList,
            CustomerAccount,
            ColumnMapping,
            AnalyzeResponse,
            RowIssue,
            ValidationReport,
            ProcessReport,
            PlanList,
            CurrentSubscription,
            SubscribeRequest,
            CheckoutResponse,
            WebhookNotification,
            admin::SalesSummary,
            params::Pagination,
            params::ProductQuery,
            params::SaleListQuery,
            params::ManualProductQuery,
            Meta,
            ErrorDetail,
            ApiResponse<ErrorDetail>,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<SaleWithItems>,
            ApiResponse<SaleList>,
            ApiResponse<CustomerAccount>,
            ApiResponse<ValidationReport>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Products", description = "Catalog and stock endpoints"),
        (name = "Sales", description = "Checkout, cancellation and manual products"),
        (name = "Customers", description = "Customer and credit account endpoints"),
        (name = "Imports", description = "Spreadsheet import pipeline"),
        (name = "Subscription", description = "Plans and gateway billing"),
        (name = "Admin", description = "Back-office endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
