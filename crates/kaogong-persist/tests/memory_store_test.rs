use chrono::{Duration, TimeZone, Utc};
use kaogong_persist::{
    ChatMessage, CodeCheck, CodePurpose, InMemoryPersistenceClient, NewNote, NoteUpdate,
    NotebookStore, Order, OrderStatus, OrderStore, PersistError, SessionStore, UsageOutcome, User,
    UserStore, VerificationCode, VerificationStore, DEFAULT_SESSION_TITLE,
};
use kaogong_types::{MembershipPlan, UsageKind, UsageLimits};

async fn store_with_user() -> (InMemoryPersistenceClient, String) {
    let store = InMemoryPersistenceClient::new();
    let user = store
        .create_user(User::new("13800000000", "hash", "学员"))
        .await
        .unwrap();
    (store, user.id)
}

#[tokio::test]
async fn test_duplicate_phone_is_conflict() {
    let (store, _) = store_with_user().await;
    let err = store
        .create_user(User::new("13800000000", "other", "x"))
        .await
        .unwrap_err();
    assert!(matches!(err, PersistError::Conflict(_)));
    assert!(store.find_user_by_phone("13800000000").await.unwrap().is_some());
    assert!(store.find_user_by_phone("13900000000").await.unwrap().is_none());
}

#[tokio::test]
async fn test_usage_quota_resets_next_china_day() {
    let (store, user_id) = store_with_user().await;
    let limits = UsageLimits {
        chat_daily: 2,
        quiz_daily: 1,
    };
    // 23:00 Beijing time on March 1st
    let evening = Utc.with_ymd_and_hms(2026, 3, 1, 15, 0, 0).unwrap();

    let first = store
        .check_and_deduct_usage(&user_id, UsageKind::Chat, &limits, evening)
        .await
        .unwrap();
    assert_eq!(first, UsageOutcome::Allowed { remaining: 1 });
    store
        .check_and_deduct_usage(&user_id, UsageKind::Chat, &limits, evening)
        .await
        .unwrap();
    let third = store
        .check_and_deduct_usage(&user_id, UsageKind::Chat, &limits, evening)
        .await
        .unwrap();
    assert_eq!(third, UsageOutcome::Exhausted { limit: 2 });

    // 00:30 Beijing time on March 2nd, still March 1st in UTC
    let after_midnight = evening + Duration::minutes(90);
    let next_day = store
        .check_and_deduct_usage(&user_id, UsageKind::Chat, &limits, after_midnight)
        .await
        .unwrap();
    assert_eq!(next_day, UsageOutcome::Allowed { remaining: 1 });
}

#[tokio::test]
async fn test_refund_returns_quota() {
    let (store, user_id) = store_with_user().await;
    let limits = UsageLimits {
        chat_daily: 1,
        quiz_daily: 1,
    };
    let now = Utc::now();
    store
        .check_and_deduct_usage(&user_id, UsageKind::Quiz, &limits, now)
        .await
        .unwrap();
    store.refund_usage(&user_id, UsageKind::Quiz, now).await.unwrap();
    let again = store
        .check_and_deduct_usage(&user_id, UsageKind::Quiz, &limits, now)
        .await
        .unwrap();
    assert!(again.was_counted());
}

#[tokio::test]
async fn test_members_are_not_counted() {
    let (store, user_id) = store_with_user().await;
    let now = Utc::now();
    store
        .activate_membership(&user_id, MembershipPlan::Monthly, now)
        .await
        .unwrap();
    let limits = UsageLimits {
        chat_daily: 0,
        quiz_daily: 0,
    };
    let outcome = store
        .check_and_deduct_usage(&user_id, UsageKind::Chat, &limits, now)
        .await
        .unwrap();
    assert_eq!(outcome, UsageOutcome::Unlimited);
}

#[tokio::test]
async fn test_session_lifecycle() {
    let (store, user_id) = store_with_user().await;
    let session = store.create_session(&user_id, None).await.unwrap();
    assert_eq!(session.title, DEFAULT_SESSION_TITLE);

    assert!(store
        .append_message(&user_id, &session.id, ChatMessage::user("什么是行测？"))
        .await
        .unwrap());
    assert!(store
        .append_message(&user_id, &session.id, ChatMessage::assistant("行政职业能力测验。"))
        .await
        .unwrap());
    assert!(!store
        .append_message(&user_id, "missing", ChatMessage::user("x"))
        .await
        .unwrap());

    let listed = store.list_sessions(&user_id).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].message_count, 2);

    assert!(store.rename_session(&user_id, &session.id, "行测入门").await.unwrap());
    let loaded = store.get_session(&user_id, &session.id).await.unwrap().unwrap();
    assert_eq!(loaded.title, "行测入门");
    assert_eq!(loaded.messages.len(), 2);

    assert!(store.delete_session(&user_id, &session.id).await.unwrap());
    assert!(!store.delete_session(&user_id, &session.id).await.unwrap());
    assert!(store.get_session(&user_id, &session.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_sessions_are_private() {
    let (store, owner) = store_with_user().await;
    let other = store
        .create_user(User::new("13900000000", "hash", "另一位"))
        .await
        .unwrap();
    let session = store.create_session(&owner, Some("申论".into())).await.unwrap();
    assert!(store.get_session(&other.id, &session.id).await.unwrap().is_none());
    assert!(!store.delete_session(&other.id, &session.id).await.unwrap());
}

#[tokio::test]
async fn test_deleting_category_uncategorises_notes() {
    let (store, user_id) = store_with_user().await;
    let category = store.create_category(&user_id, "常识判断").await.unwrap();
    assert!(matches!(
        store.create_category(&user_id, "常识判断").await,
        Err(PersistError::Conflict(_))
    ));

    let note = store
        .add_note(
            &user_id,
            NewNote {
                category_id: Some(category.id.clone()),
                question: "我国的根本政治制度是？".into(),
                answer: "人民代表大会制度".into(),
                content: String::new(),
            },
        )
        .await
        .unwrap();
    assert_eq!(store.list_notes(&user_id, Some(&category.id)).await.unwrap().len(), 1);

    assert!(store.delete_category(&user_id, &category.id).await.unwrap());
    let notes = store.list_notes(&user_id, None).await.unwrap();
    assert_eq!(notes[0].id, note.id);
    assert_eq!(notes[0].category_id, None);
}

#[tokio::test]
async fn test_note_with_unknown_category_is_rejected() {
    let (store, user_id) = store_with_user().await;
    let err = store
        .add_note(
            &user_id,
            NewNote {
                category_id: Some("nope".into()),
                question: "q".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PersistError::NotFound(_)));
}

#[tokio::test]
async fn test_update_note_fields() {
    let (store, user_id) = store_with_user().await;
    let note = store
        .add_note(
            &user_id,
            NewNote {
                question: "q".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let updated = store
        .update_note(
            &user_id,
            &note.id,
            NoteUpdate {
                content: Some("易错：注意时间".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.question, "q");
    assert_eq!(updated.content, "易错：注意时间");
    assert!(store
        .update_note(&user_id, "missing", NoteUpdate::default())
        .await
        .unwrap()
        .is_none());
    assert!(store.delete_note(&user_id, &note.id).await.unwrap());
}

#[tokio::test]
async fn test_order_is_paid_once() {
    let (store, user_id) = store_with_user().await;
    let order = store
        .create_order(Order::new(&user_id, MembershipPlan::Monthly, "KG20260301000000abcd1234"))
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.amount_cents, 2990);

    let now = Utc::now();
    let paid = store
        .mark_order_paid(&order.out_trade_no, "T1", now)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(paid.status, OrderStatus::Paid);
    assert_eq!(paid.trade_no.as_deref(), Some("T1"));
    assert!(store
        .mark_order_paid(&order.out_trade_no, "T1", now)
        .await
        .unwrap()
        .is_none());
    assert!(store.mark_order_paid("unknown", "T2", now).await.unwrap().is_none());
}

#[tokio::test]
async fn test_membership_renewal_stacks() {
    let (store, user_id) = store_with_user().await;
    let now = Utc::now();
    let first = store
        .activate_membership(&user_id, MembershipPlan::Monthly, now)
        .await
        .unwrap();
    let second = store
        .activate_membership(&user_id, MembershipPlan::Monthly, now)
        .await
        .unwrap();
    assert_eq!(second.expires_at, first.expires_at + Duration::days(31));

    let user = store.find_user(&user_id).await.unwrap().unwrap();
    assert!(user.is_member(now));
}

#[tokio::test]
async fn test_fulfil_order_applies_once() {
    let (store, user_id) = store_with_user().await;
    let order = store
        .create_order(Order::new(&user_id, MembershipPlan::Quarterly, "KG20260301000000beef0001"))
        .await
        .unwrap();
    let now = Utc::now();

    let granted = store.fulfil_order(&order, now).await.unwrap().unwrap();
    assert_eq!(granted.plan, MembershipPlan::Quarterly);
    assert!(store.fulfil_order(&order, now).await.unwrap().is_none());

    let user = store.find_user(&user_id).await.unwrap().unwrap();
    assert_eq!(user.membership.unwrap().expires_at, granted.expires_at);

    // A different order for the same user still stacks
    let renewal = store
        .create_order(Order::new(&user_id, MembershipPlan::Monthly, "KG20260301000000beef0002"))
        .await
        .unwrap();
    let renewed = store.fulfil_order(&renewal, now).await.unwrap().unwrap();
    assert_eq!(renewed.expires_at, granted.expires_at + Duration::days(31));
}

#[tokio::test]
async fn test_verification_code_attempts() {
    let store = InMemoryPersistenceClient::new();
    let now = Utc::now();
    store
        .save_code(VerificationCode::new(
            "13800000000",
            CodePurpose::Login,
            "123456",
            now,
            Duration::minutes(5),
        ))
        .await
        .unwrap();

    let consume = |code: &'static str| {
        store.consume_code("13800000000", CodePurpose::Login, code, now, 2)
    };
    assert_eq!(consume("000000").await.unwrap(), CodeCheck::Mismatch);
    assert_eq!(consume("111111").await.unwrap(), CodeCheck::Mismatch);
    assert_eq!(consume("123456").await.unwrap(), CodeCheck::TooManyAttempts);
}

#[tokio::test]
async fn test_verification_code_single_use_and_expiry() {
    let store = InMemoryPersistenceClient::new();
    let now = Utc::now();
    let save = |purpose| {
        store.save_code(VerificationCode::new(
            "13800000000",
            purpose,
            "123456",
            now,
            Duration::minutes(5),
        ))
    };
    save(CodePurpose::Register).await.unwrap();
    save(CodePurpose::ResetPassword).await.unwrap();

    let check = store
        .consume_code("13800000000", CodePurpose::Register, "123456", now, 5)
        .await
        .unwrap();
    assert_eq!(check, CodeCheck::Valid);
    let reused = store
        .consume_code("13800000000", CodePurpose::Register, "123456", now, 5)
        .await
        .unwrap();
    assert_eq!(reused, CodeCheck::Missing);

    let later = now + Duration::minutes(6);
    let expired = store
        .consume_code("13800000000", CodePurpose::ResetPassword, "123456", later, 5)
        .await
        .unwrap();
    assert_eq!(expired, CodeCheck::Expired);
}
