mod common;

use common::{insert_goal, insert_sponsor, insert_team, test_db};
use fundchamps::entities::{campaign_goal, donation, player, sponsor};
use fundchamps::goals::{active_goal, counted_sponsor_cents, set_goal};
use fundchamps::seed::{seed_demo, SeedOptions, DEMO_GOAL_CENTS};
use sea_orm::{ActiveModelTrait, EntityTrait, ModelTrait, PaginatorTrait, Set};

async fn reload(db: &sea_orm::DatabaseConnection, id: i32) -> campaign_goal::Model {
    campaign_goal::Entity::find_by_id(id).one(db).await.unwrap().unwrap()
}

#[tokio::test]
async fn total_matches_counted_sponsors_after_update() {
    let db = test_db().await;
    let team = insert_team(&db, "Connect ATX Elite").await;
    let other = insert_team(&db, "Round Rock Storm").await;
    let goal = insert_goal(&db, team.id, 1_000_000).await;

    insert_sponsor(&db, "Acme", Some(team.id), 150_000, "approved").await;
    insert_sponsor(&db, "Beta", Some(team.id), 50_000, "paid").await;
    insert_sponsor(&db, "Gamma", Some(team.id), 70_000, "pending").await;
    insert_sponsor(&db, "Delta", Some(team.id), 30_000, "refunded").await;
    insert_sponsor(&db, "Elsewhere", Some(other.id), 990_000, "approved").await;
    let hidden = insert_sponsor(&db, "Hidden", Some(team.id), 20_000, "completed").await;
    let mut hidden: sponsor::ActiveModel = hidden.into();
    hidden.deleted = Set(true);
    hidden.update(&db).await.unwrap();

    let updated = reload(&db, goal.id).await.update_progress_from_donations(&db, true).await.unwrap();
    assert_eq!(updated.total, 200_000);
    assert_eq!(updated.total, counted_sponsor_cents(&db, Some(team.id)).await.unwrap());
    assert_eq!(reload(&db, goal.id).await.total, 200_000);
}

#[tokio::test]
async fn save_hooks_keep_goal_in_sync() {
    let db = test_db().await;
    let team = insert_team(&db, "Kyle Hawks").await;
    let goal = insert_goal(&db, team.id, 500_000).await;

    let s = insert_sponsor(&db, "Acme", Some(team.id), 120_000, "approved").await;
    assert_eq!(reload(&db, goal.id).await.total, 120_000);

    let mut active: sponsor::ActiveModel = s.clone().into();
    active.status = Set("refunded".into());
    let s = active.update(&db).await.unwrap();
    assert_eq!(reload(&db, goal.id).await.total, 0);

    let mut active: sponsor::ActiveModel = s.into();
    active.status = Set("success".into());
    let s = active.update(&db).await.unwrap();
    assert_eq!(reload(&db, goal.id).await.total, 120_000);

    s.delete(&db).await.unwrap();
    assert_eq!(reload(&db, goal.id).await.total, 0);
}

#[tokio::test]
async fn sponsors_without_team_or_goal_still_save() {
    let db = test_db().await;
    let team = insert_team(&db, "Buda Lions").await;
    let loose = insert_sponsor(&db, "Loose", None, 10_000, "approved").await;
    let no_goal = insert_sponsor(&db, "No Goal", Some(team.id), -500, "whatever").await;
    assert_eq!(loose.tier.as_deref(), Some("Supporter"));
    assert_eq!(no_goal.amount, 0);
    assert_eq!(no_goal.status, "pending");
}

#[tokio::test]
async fn explicit_tier_is_kept_and_auto_tier_follows_amount() {
    let db = test_db().await;
    let auto = insert_sponsor(&db, "Auto", None, 600_000, "approved").await;
    assert_eq!(auto.tier.as_deref(), Some("Platinum"));

    let explicit = sponsor::ActiveModel {
        name: Set("Explicit".into()),
        amount: Set(10_000),
        tier: Set(Some("VIP".into())),
        ..Default::default()
    }
    .insert(&db)
    .await
    .unwrap();
    assert_eq!(explicit.tier.as_deref(), Some("VIP"));
}

#[tokio::test]
async fn newest_active_goal_wins_and_set_goal_updates_it() {
    let db = test_db().await;
    let team = insert_team(&db, "Leander Thunder").await;
    let first = insert_goal(&db, team.id, 100_000).await;
    let second = insert_goal(&db, team.id, 200_000).await;
    assert!(second.created_at >= first.created_at);

    let found = active_goal(&db, Some(team.id)).await.unwrap().unwrap();
    assert_eq!(found.id, second.id);

    insert_sponsor(&db, "Acme", Some(team.id), 40_000, "approved").await;
    let updated = set_goal(&db, team.id, 300_000).await.unwrap();
    assert_eq!(updated.id, second.id);
    assert_eq!(updated.goal_amount, 300_000);
    assert_eq!(updated.total, 40_000);
}

#[tokio::test]
async fn donations_get_tiers_and_never_go_negative() {
    let db = test_db().await;
    let d = donation::ActiveModel {
        name: Set("Jane Parker".into()),
        amount_cents: Set(250_000),
        ..Default::default()
    }
    .insert(&db)
    .await
    .unwrap();
    assert_eq!(d.tier.as_deref(), Some("Gold"));
    assert_eq!(d.short_name(), "Jane P.");

    let negative = donation::ActiveModel {
        name: Set("Refund".into()),
        amount_cents: Set(-10),
        ..Default::default()
    }
    .insert(&db)
    .await
    .unwrap();
    assert_eq!(negative.amount_cents, 0);
}

#[tokio::test]
async fn seed_demo_fills_goal_totals() {
    let db = test_db().await;
    let report = seed_demo(&db, SeedOptions { teams: 2, sponsors: 6, players: 4, clear: false })
        .await
        .unwrap();
    assert_eq!(report.teams, 2);
    assert_eq!(report.goals, 2);
    assert_eq!(sponsor::Entity::find().count(&db).await.unwrap(), 6);

    for goal in campaign_goal::Entity::find().all(&db).await.unwrap() {
        assert_eq!(goal.goal_amount, DEMO_GOAL_CENTS);
        assert_eq!(goal.total, counted_sponsor_cents(&db, Some(goal.team_id)).await.unwrap());
        assert!(goal.total > 0);
    }

    let again = seed_demo(&db, SeedOptions { teams: 1, sponsors: 1, players: 0, clear: true })
        .await
        .unwrap();
    assert!(again.cleared > 0);
    assert_eq!(sponsor::Entity::find().count(&db).await.unwrap(), 1);
}

#[tokio::test]
async fn deleting_a_team_removes_its_roster_sponsors_and_goals() {
    let db = test_db().await;
    let team = insert_team(&db, "Pflugerville Panthers").await;
    let keep = insert_team(&db, "Hutto Hippos").await;
    let goal = insert_goal(&db, team.id, 500_000).await;
    let sponsor = insert_sponsor(&db, "Acme", Some(team.id), 80_000, "paid").await;
    let other = insert_sponsor(&db, "Elsewhere", Some(keep.id), 10_000, "paid").await;
    player::ActiveModel {
        name: Set("Maya".into()),
        team_id: Set(Some(team.id)),
        ..Default::default()
    }
    .insert(&db)
    .await
    .unwrap();
    let gift = donation::ActiveModel {
        name: Set("Jo".into()),
        team_id: Set(Some(team.id)),
        amount_cents: Set(2_000),
        ..Default::default()
    }
    .insert(&db)
    .await
    .unwrap();

    team.delete(&db).await.unwrap();

    assert!(sponsor::Entity::find_by_id(sponsor.id).one(&db).await.unwrap().is_none());
    assert!(campaign_goal::Entity::find_by_id(goal.id).one(&db).await.unwrap().is_none());
    assert_eq!(player::Entity::find().count(&db).await.unwrap(), 0);
    assert!(sponsor::Entity::find_by_id(other.id).one(&db).await.unwrap().is_some());

    let gift = donation::Entity::find_by_id(gift.id).one(&db).await.unwrap().unwrap();
    assert_eq!(gift.team_id, None);
}
