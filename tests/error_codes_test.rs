mod common;

use common::{input, memory_dispatcher};
use serde_json::json;
use stripe_dispatch::application::registry::Registry;
use stripe_dispatch::infrastructure::in_memory::DECLINED_TOKEN;

#[tokio::test]
async fn test_every_unregistered_resource_is_code_one() {
    let dispatcher = memory_dispatcher();

    for resource in ["anything", "", "Charges", "payment_intents", "charges.create"] {
        let outcome = dispatcher
            .dispatch(input(json!({"resource": resource, "method": "create"})))
            .await;
        let err = outcome.error().unwrap();
        assert_eq!(err.code, 1);
        assert_eq!(err.message, format!("Unsupported resource type '{resource}'"));
    }
}

#[tokio::test]
async fn test_every_unregistered_method_is_code_two() {
    let dispatcher = memory_dispatcher();

    for (resource, _) in Registry::standard().resources() {
        for method in ["", "destroy", "Create", "createCharge"] {
            let outcome = dispatcher
                .dispatch(input(json!({
                    "resource": resource,
                    "method": method,
                    "paramOrder": []
                })))
                .await;
            let err = outcome.error().unwrap();
            assert_eq!(err.code, 2, "{resource}.{method}");
            assert_eq!(
                err.message,
                format!("Unsupported Stripe client method '{method}'")
            );
        }
    }
}

#[tokio::test]
async fn test_every_registered_method_without_order_is_code_three() {
    let dispatcher = memory_dispatcher();

    for (resource, methods) in Registry::standard().resources() {
        for method in methods.methods() {
            let outcome = dispatcher
                .dispatch(input(json!({"resource": resource, "method": method})))
                .await;
            let err = outcome.error().unwrap();
            assert_eq!(err.code, 3, "{resource}.{method}");
            assert!(err.cause.is_none());
        }
    }
}

#[tokio::test]
async fn test_downstream_rejection_is_code_four_with_cause() {
    let dispatcher = memory_dispatcher();

    let outcome = dispatcher
        .dispatch(input(json!({
            "resource": "charges",
            "method": "create",
            "charge": {"amount": 1099, "currency": "usd", "source": DECLINED_TOKEN},
            "paramOrder": ["charge"]
        })))
        .await;

    assert!(outcome.ok().is_none());
    let err = outcome.error().unwrap();
    assert_eq!(err.code, 4);
    assert_eq!(
        err.message,
        "Stripe returned an error for call to charges.create(...)"
    );
    let cause = err.cause.as_ref().unwrap();
    assert_eq!(cause["type"], "card_error");
    assert_eq!(cause["code"], "card_declined");
}

#[tokio::test]
async fn test_unknown_object_is_code_four() {
    let dispatcher = memory_dispatcher();

    let outcome = dispatcher
        .dispatch(input(json!({
            "resource": "customers",
            "method": "retrieve",
            "id": "cus_missing",
            "paramOrder": ["id"]
        })))
        .await;

    let err = outcome.error().unwrap();
    assert_eq!(err.code, 4);
    assert_eq!(err.cause.as_ref().unwrap()["code"], "resource_missing");
}

#[tokio::test]
async fn test_name_missing_from_args_binds_as_omitted() {
    let dispatcher = memory_dispatcher();

    // `charge` is named in the order but never supplied.
    let outcome = dispatcher
        .dispatch(input(json!({
            "resource": "charges",
            "method": "create",
            "paramOrder": ["charge"]
        })))
        .await;

    let err = outcome.error().unwrap();
    assert_eq!(err.code, 4);
    assert_eq!(err.cause.as_ref().unwrap()["param"], "amount");
}
