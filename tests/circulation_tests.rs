//! Borrow, return and renew against the in-process store

mod common;

use chrono::{Duration, Utc};
use common::Harness;
use elidune_circulation::{
    error::{AppError, Policy},
    models::{
        loan::LoanStatus, notification::NotificationCategory, reservation::ReservationStatus,
    },
    repository::CirculationStore,
};

#[tokio::test]
async fn test_borrow_takes_one_copy() {
    let h = Harness::new();
    let book = h.store.add_book("Dune", 2).await;
    let user = h.store.add_user(5).await;

    let loan = h.services.circulation.borrow(book.id, user.id).await.unwrap();

    assert_eq!(loan.status, LoanStatus::Out);
    assert_eq!(loan.due_date - loan.begin_date, Duration::days(30));
    assert_eq!(loan.renew_count, 0);

    let book = h.book(book.id).await;
    assert_eq!(book.available, 1);
    assert_eq!(book.times, 1);
    let state = h.store.snapshot().await;
    assert_eq!(state.users[&user.id].active_loan_count, 1);
    h.assert_consistent().await;
}

#[tokio::test]
async fn test_third_copy_of_same_title_rejected() {
    let h = Harness::new();
    let book = h.store.add_book("Dune", 3).await;
    let user = h.store.add_user(5).await;

    h.services.circulation.borrow(book.id, user.id).await.unwrap();
    h.services.circulation.borrow(book.id, user.id).await.unwrap();
    let third = h.services.circulation.borrow(book.id, user.id).await;

    assert!(matches!(
        third,
        Err(AppError::PolicyViolation(Policy::SameTitleTwice))
    ));
    assert_eq!(h.book(book.id).await.available, 1);
    h.assert_consistent().await;
}

#[tokio::test]
async fn test_out_of_stock() {
    let h = Harness::new();
    let book = h.store.add_book("Dune", 1).await;
    let first = h.store.add_user(5).await;
    let second = h.store.add_user(5).await;

    h.services.circulation.borrow(book.id, first.id).await.unwrap();
    let result = h.services.circulation.borrow(book.id, second.id).await;

    assert!(matches!(
        result,
        Err(AppError::PolicyViolation(Policy::OutOfStock))
    ));
    assert_eq!(h.store.snapshot().await.users[&second.id].active_loan_count, 0);
}

#[tokio::test]
async fn test_borrow_limit_leaves_stock_untouched() {
    let h = Harness::new();
    let dune = h.store.add_book("Dune", 1).await;
    let emma = h.store.add_book("Emma", 1).await;
    let user = h.store.add_user(1).await;

    h.services.circulation.borrow(dune.id, user.id).await.unwrap();
    let result = h.services.circulation.borrow(emma.id, user.id).await;

    assert!(matches!(
        result,
        Err(AppError::PolicyViolation(Policy::MaxBorrowLimit))
    ));
    let emma = h.book(emma.id).await;
    assert_eq!(emma.available, 1);
    assert_eq!(emma.times, 0);
    h.assert_consistent().await;
}

#[tokio::test]
async fn test_borrow_unknown_book_or_user() {
    let h = Harness::new();
    let book = h.store.add_book("Dune", 1).await;
    let user = h.store.add_user(5).await;

    assert!(matches!(
        h.services.circulation.borrow(999, user.id).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        h.services.circulation.borrow(book.id, 999).await,
        Err(AppError::NotFound(_))
    ));
    assert_eq!(h.book(book.id).await.available, 1);
}

#[tokio::test]
async fn test_return_keeps_due_date() {
    let h = Harness::new();
    let book = h.store.add_book("Dune", 1).await;
    let user = h.store.add_user(5).await;
    let loan = h.services.circulation.borrow(book.id, user.id).await.unwrap();

    let returned = h
        .services
        .circulation
        .return_book(loan.id, user.id)
        .await
        .unwrap();

    assert_eq!(returned.status, LoanStatus::Returned);
    assert_eq!(returned.due_date, loan.due_date);
    let returned_at = returned.returned_at.expect("return instant recorded");
    assert!(returned_at >= loan.begin_date);
    assert_eq!(returned.end_date(), returned_at);

    assert_eq!(h.book(book.id).await.available, 1);
    assert_eq!(h.store.snapshot().await.users[&user.id].active_loan_count, 0);
    h.assert_consistent().await;
}

#[tokio::test]
async fn test_return_twice_conflicts() {
    let h = Harness::new();
    let book = h.store.add_book("Dune", 1).await;
    let user = h.store.add_user(5).await;
    let loan = h.services.circulation.borrow(book.id, user.id).await.unwrap();

    h.services.circulation.return_book(loan.id, user.id).await.unwrap();
    let again = h.services.circulation.return_book(loan.id, user.id).await;

    assert!(matches!(again, Err(AppError::Conflict(_))));
    assert_eq!(h.book(book.id).await.available, 1);
    h.assert_consistent().await;
}

#[tokio::test]
async fn test_return_by_other_user_unauthorized() {
    let h = Harness::new();
    let book = h.store.add_book("Dune", 1).await;
    let owner = h.store.add_user(5).await;
    let other = h.store.add_user(5).await;
    let loan = h.services.circulation.borrow(book.id, owner.id).await.unwrap();

    let result = h.services.circulation.return_book(loan.id, other.id).await;

    assert!(matches!(result, Err(AppError::Unauthorized(_))));
    assert_eq!(h.book(book.id).await.available, 0);
    assert!(matches!(
        h.services.circulation.return_book(999, owner.id).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_renew_extends_from_due_date() {
    let h = Harness::new();
    let book = h.store.add_book("Dune", 1).await;
    let user = h.store.add_user(5).await;
    let loan = h.services.circulation.borrow(book.id, user.id).await.unwrap();

    let renewed = h.services.circulation.renew(loan.id, user.id).await.unwrap();
    assert_eq!(renewed.due_date, loan.due_date + Duration::days(30));
    assert_eq!(renewed.renew_count, 1);

    let again = h.services.circulation.renew(loan.id, user.id).await.unwrap();
    assert_eq!(again.due_date, loan.due_date + Duration::days(60));

    let book = h.book(book.id).await;
    assert_eq!(book.available, 0);
    assert_eq!(book.times, 1);
}

#[tokio::test]
async fn test_renew_returned_loan_conflicts() {
    let h = Harness::new();
    let book = h.store.add_book("Dune", 1).await;
    let user = h.store.add_user(5).await;
    let loan = h.services.circulation.borrow(book.id, user.id).await.unwrap();
    h.services.circulation.return_book(loan.id, user.id).await.unwrap();

    let result = h.services.circulation.renew(loan.id, user.id).await;
    assert!(matches!(result, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn test_return_promotes_oldest_pending() {
    let h = Harness::new();
    let book = h.store.add_book("Dune", 1).await;
    let holder = h.store.add_user(5).await;
    let first = h.store.add_user(5).await;
    let second = h.store.add_user(5).await;

    let loan = h.services.circulation.borrow(book.id, holder.id).await.unwrap();
    let r1 = h.services.reservations.order(book.id, first.id).await.unwrap();
    let r2 = h.services.reservations.order(book.id, second.id).await.unwrap();
    assert_eq!(r1.status, ReservationStatus::Pending);

    h.services.circulation.return_book(loan.id, holder.id).await.unwrap();

    let state = h.store.snapshot().await;
    assert_eq!(state.reservations[&r1.id].status, ReservationStatus::Ready);
    assert!(state.reservations[&r1.id].ready_at.is_some());
    assert_eq!(state.reservations[&r2.id].status, ReservationStatus::Pending);
    assert_eq!(h.inbox(first.id, NotificationCategory::ReservationReady).await, 1);
    assert_eq!(h.inbox(second.id, NotificationCategory::ReservationReady).await, 0);
    h.assert_consistent().await;
}

#[tokio::test]
async fn test_listing_and_counters() {
    let h = Harness::new();
    let dune = h.store.add_book("Dune", 2).await;
    let emma = h.store.add_book("Emma", 1).await;
    let user = h.store.add_user(5).await;
    let now = Utc::now();

    let late = h
        .store
        .seed_loan(dune.id, user.id, now - Duration::days(40), now - Duration::days(10))
        .await
        .unwrap();
    let current = h.services.circulation.borrow(emma.id, user.id).await.unwrap();
    h.services.circulation.return_book(current.id, user.id).await.unwrap();

    let all = h.services.circulation.list_user_loans(user.id, None).await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].id, current.id);

    let out = h
        .services
        .circulation
        .list_user_loans(user.id, Some(LoanStatus::Out))
        .await
        .unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].id, late.id);

    assert_eq!(h.services.circulation.count_active().await.unwrap(), 1);
    assert_eq!(h.services.circulation.count_overdue().await.unwrap(), 1);
    assert_eq!(h.services.store.count_active_loans().await.unwrap(), 1);
}

#[tokio::test]
async fn test_mixed_sequence_keeps_invariants() {
    let h = Harness::new();
    let books = [
        h.store.add_book("Dune", 1).await,
        h.store.add_book("Emma", 2).await,
        h.store.add_book("Ulysses", 3).await,
    ];
    let users = [
        h.store.add_user(2).await,
        h.store.add_user(3).await,
        h.store.add_user(1).await,
    ];

    let mut open = Vec::new();
    for round in 0..4 {
        for (i, user) in users.iter().enumerate() {
            let book = &books[(i + round) % books.len()];
            if let Ok(loan) = h.services.circulation.borrow(book.id, user.id).await {
                open.push(loan);
            }
            h.assert_consistent().await;
        }
        if round % 2 == 1 {
            for loan in open.drain(..) {
                h.services
                    .circulation
                    .return_book(loan.id, loan.user_id)
                    .await
                    .unwrap();
                h.assert_consistent().await;
            }
        }
    }
}
