//! Demo data for local runs and live demos.

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait, QueryFilter,
    Set, TransactionTrait,
};

use crate::entities::{campaign_goal, donation, player, sponsor, team, SponsorStatus};

const CITIES: [&str; 8] =
    ["Austin", "Round Rock", "Cedar Park", "Pflugerville", "Georgetown", "Leander", "Kyle", "Buda"];
const MASCOTS: [&str; 6] = ["Elite", "Storm", "Rockets", "Hawks", "Lions", "Thunder"];
const FIRST_NAMES: [&str; 10] =
    ["Jordan", "Avery", "Marcus", "Elijah", "Jaden", "Isaiah", "Cameron", "Malik", "Noah", "Tyler"];
const LAST_NAMES: [&str; 8] =
    ["Johnson", "Garcia", "Williams", "Brown", "Martinez", "Davis", "Lopez", "Walker"];
const COMPANIES: [&str; 8] = [
    "Lone Star Dental",
    "Barton Creek Realty",
    "Hill Country Auto",
    "Eastside Tacos",
    "Capitol Physical Therapy",
    "Lakeway Insurance",
    "Riverside Fitness",
    "South Congress Coffee",
];
const ROLES: [&str; 3] = ["Guard", "Forward", "Center"];
const TIERS: [&str; 5] = ["Bronze", "Silver", "Gold", "Platinum", "VIP"];

/// Default demo goal: $10,000.
pub const DEMO_GOAL_CENTS: i64 = 1_000_000;

#[derive(Debug, Clone, Copy)]
pub struct SeedOptions {
    pub teams: usize,
    pub sponsors: usize,
    pub players: usize,
    pub clear: bool,
}

impl Default for SeedOptions {
    fn default() -> Self {
        Self { teams: 1, sponsors: 8, players: 10, clear: false }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeedReport {
    pub cleared: u64,
    pub teams: usize,
    pub players: usize,
    pub sponsors: usize,
    pub goals: usize,
}

/// Removes sponsors, donations, players, goals and teams.
pub async fn clear_demo_data<C: ConnectionTrait>(db: &C) -> Result<u64, DbErr> {
    let mut cleared = 0;
    cleared += sponsor::Entity::delete_many().exec(db).await?.rows_affected;
    cleared += donation::Entity::delete_many().exec(db).await?.rows_affected;
    cleared += player::Entity::delete_many().exec(db).await?.rows_affected;
    cleared += campaign_goal::Entity::delete_many().exec(db).await?.rows_affected;
    cleared += team::Entity::delete_many().exec(db).await?.rows_affected;
    tracing::info!(cleared, "demo data cleared");
    Ok(cleared)
}

async fn unused_slug<C: ConnectionTrait>(db: &C, name: &str) -> Result<String, DbErr> {
    let base = team::slugify(name);
    let mut candidate = base.clone();
    let mut n = 1;
    while team::Entity::find()
        .filter(team::Column::Slug.eq(candidate.as_str()))
        .count(db)
        .await?
        > 0
    {
        n += 1;
        candidate = format!("{base}-{n}");
    }
    Ok(candidate)
}

/// Seeds teams, players, one active goal per team and approved sponsors in a
/// single transaction. Names and amounts are deterministic.
pub async fn seed_demo<C>(db: &C, options: SeedOptions) -> Result<SeedReport, DbErr>
where
    C: ConnectionTrait + TransactionTrait,
{
    let txn = db.begin().await?;
    let mut report = SeedReport::default();
    if options.clear {
        report.cleared = clear_demo_data(&txn).await?;
    }

    let mut teams = Vec::with_capacity(options.teams);
    for i in 0..options.teams {
        let name = format!("{} {}", CITIES[i % CITIES.len()], MASCOTS[(i * 5 + 1) % MASCOTS.len()]);
        let slug = unused_slug(&txn, &name).await?;
        let created = team::ActiveModel {
            slug: Set(slug),
            meta_description: Set(Some(format!("Support {name} youth basketball."))),
            theme_color: Set(Some(format!("#{:06x}", (i as u32 * 0x3a5f1d + 0xfacc15) & 0xff_ffff))),
            team_name: Set(name),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        teams.push(created);
    }
    report.teams = teams.len();

    let team_for = |i: usize| teams.get(i % teams.len().max(1)).map(|t| t.id);

    for i in 0..options.players {
        let name = format!(
            "{} {}",
            FIRST_NAMES[i % FIRST_NAMES.len()],
            LAST_NAMES[(i * 3) % LAST_NAMES.len()]
        );
        player::ActiveModel {
            name: Set(name),
            role: Set(Some(ROLES[i % ROLES.len()].to_string())),
            photo_url: Set(Some(format!("https://i.pravatar.cc/200?img={}", i % 70 + 1))),
            team_id: Set(team_for(i)),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
    }
    report.players = options.players;

    // Goals go in before sponsors so the save hooks fill their totals.
    for team in &teams {
        let has_goal = campaign_goal::Entity::find()
            .filter(campaign_goal::Column::TeamId.eq(team.id))
            .filter(campaign_goal::Column::Active.eq(true))
            .count(&txn)
            .await?
            > 0;
        if !has_goal {
            campaign_goal::ActiveModel {
                team_id: Set(team.id),
                goal_amount: Set(DEMO_GOAL_CENTS),
                active: Set(true),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
            report.goals += 1;
        }
    }

    for i in 0..options.sponsors {
        let company = COMPANIES[i % COMPANIES.len()];
        let dollars = (i as i64 * 617) % 4900 + 100;
        sponsor::ActiveModel {
            name: Set(company.to_string()),
            email: Set(Some(format!("partners+{}@{}.example", i + 1, team::slugify(company)))),
            amount: Set(dollars * 100),
            status: Set(SponsorStatus::Approved.as_str().to_string()),
            tier: Set(Some(TIERS[i % TIERS.len()].to_string())),
            notes: Set(Some("Proud to back our hometown hoopers.".to_string())),
            team_id: Set(team_for(i)),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
    }
    report.sponsors = options.sponsors;

    txn.commit().await?;
    tracing::info!(
        teams = report.teams,
        players = report.players,
        sponsors = report.sponsors,
        goals = report.goals,
        "demo data seeded"
    );
    Ok(report)
}
