// Relational schema for the season-aggregate tables and the per-game event
// tables.
//
// Stats tables are wide (one REAL column per metric), so their DDL is
// generated from the column vocabularies below. The same vocabularies are
// used by the dataset reader to reject columns that have no home in the
// target table.

// ---------------------------------------------------------------------------
// Column vocabularies
// ---------------------------------------------------------------------------

/// Descriptive (non-counting) player attributes. Absence is stored as NULL,
/// never coerced to zero.
pub const PLAYER_PROFILE_COLUMNS: &[&str] = &["role", "nat", "height", "age"];

/// Numeric descriptive attributes (parsed as numbers, but absence stays NULL).
pub const NUMERIC_PROFILE_COLUMNS: &[&str] = &["height", "age"];

/// Text identity/descriptive columns that are never numeric.
pub const TEXT_COLUMNS: &[&str] = &["tm_name", "name", "role", "nat"];

/// Counting/metric columns of `team_stats`, in table order.
pub const TEAM_STAT_COLUMNS: &[&str] = &[
    "gp", "w", "l", "min", "pts",
    "two_ptm", "two_pta", "two_pt_pct",
    "three_ptm", "three_pta", "three_pt_pct",
    "fgm", "fga", "fg_pct", "ftm", "fta", "ft_pct",
    "or_rebounds", "dr_rebounds", "tr_rebounds",
    "ast", "tovers", "st", "blk", "blka", "pf", "df", "val", "plus_minus",
    "pace", "poss", "shooting_chances", "off_ppp", "def_ppp",
    "off_rtg", "def_rtg", "net_rtg", "efg_pct", "ts_pct",
    "rim_freq", "rim_pps", "paint_freq", "paint_pps", "mid_freq", "mid_pps",
    "c3_freq", "c3_pps", "l3_freq", "l3_pps", "ft_ratio",
    "to_pct", "lto_pct", "dto_pct",
    "ast_pct", "ast_pct_2p", "ast_pct_3p", "ast_pct_ft", "ast_ratio", "ast_to_ratio",
    "or_pct", "or_pct_after_2p", "or_pct_after_3p", "or_pct_after_ft",
    "dr_pct", "dr_pct_after_2p", "dr_pct_after_3p", "dr_pct_after_ft",
    "tr_pct", "st_pct", "blk_pct", "blk_pct_2p", "blk_pct_3p",
    "kills", "psf_freq", "dsf_freq", "sos",
];

/// Counting/metric columns of `player_stats`, in table order. Profile
/// columns (role, nat, height, age) are stored separately.
pub const PLAYER_STAT_COLUMNS: &[&str] = &[
    "gp", "w", "l", "w_pct", "min", "pts",
    "two_ptm", "two_pta", "two_pt_pct",
    "three_ptm", "three_pta", "three_pt_pct",
    "fgm", "fga", "fg_pct", "ftm", "fta", "ft_pct",
    "or_rebounds", "dr_rebounds", "tr_rebounds",
    "ast", "tovers", "st", "blk", "blka", "pf", "df", "val", "plus_minus",
    "poss", "usg_pct", "ppp",
    "off_rtg_on", "def_rtg_on", "net_rtg_on",
    "ind_off_rtg", "ind_def_rtg", "ind_net_rtg",
    "efg_pct", "ts_pct",
    "rim_freq", "rim_pps", "paint_freq", "paint_pps", "mid_freq", "mid_pps",
    "c3_freq", "c3_pps", "l3_freq", "l3_pps", "ft_ratio",
    "to_pct", "lto_pct", "dto_pct",
    "ast_pct", "ast_pct_2p", "ast_pct_3p", "ast_pct_ft", "ast_ratio", "ast_to_ratio",
    "or_pct", "or_pct_after_2p", "or_pct_after_3p", "or_pct_after_ft",
    "dr_pct", "dr_pct_after_2p", "dr_pct_after_3p", "dr_pct_after_ft",
    "tr_pct", "st_pct", "blk_pct", "blk_pct_2p", "blk_pct_3p",
    "pf_100_poss", "df_100_poss",
    "per", "off_win_share", "def_win_share", "win_share", "win_share_per_40",
    "obpm", "dbpm", "bpm", "vorp",
    "tm_pace_on", "tm_off_rtg_on", "tm_def_rtg_on", "tm_net_rtg_on",
    "tm_ts_pct_on", "tm_or_pct_on", "tm_to_pct_on", "tm_ft_ratio_on",
    "opp_ts_pct_on", "opp_or_pct_on", "opp_to_pct_on", "opp_ft_ratio_on",
    "tm_pace_off", "tm_off_rtg_off", "tm_def_rtg_off", "tm_net_rtg_off",
    "tm_ts_pct_off", "tm_or_pct_off", "tm_to_pct_off", "tm_ft_ratio_off",
    "opp_ts_pct_off", "opp_or_pct_off", "opp_to_pct_off", "opp_ft_ratio_off",
    "tm_pace_net", "tm_off_rtg_net", "tm_def_rtg_net", "tm_net_rtg_net",
    "tm_ts_pct_net", "tm_or_pct_net", "tm_to_pct_net", "tm_ft_ratio_net",
    "opp_ts_pct_net", "opp_or_pct_net", "opp_to_pct_net", "opp_ft_ratio_net",
];

/// True if `column` is a stats column of `team_stats`.
pub fn is_team_stat_column(column: &str) -> bool {
    TEAM_STAT_COLUMNS.contains(&column)
}

/// True if `column` is a stats column of `player_stats`.
pub fn is_player_stat_column(column: &str) -> bool {
    PLAYER_STAT_COLUMNS.contains(&column)
}

// ---------------------------------------------------------------------------
// DDL
// ---------------------------------------------------------------------------

const SEASON_TABLES: &str = "
    CREATE TABLE IF NOT EXISTS seasons (
        season_id   TEXT PRIMARY KEY,
        season_name TEXT
    );

    CREATE TABLE IF NOT EXISTS teams (
        tm_name   TEXT PRIMARY KEY,
        season_id TEXT REFERENCES seasons(season_id)
    );

    CREATE TABLE IF NOT EXISTS players (
        name      TEXT PRIMARY KEY,
        role      TEXT,
        nat       TEXT,
        height    INTEGER,
        age       INTEGER,
        tm_name   TEXT REFERENCES teams(tm_name),
        season_id TEXT REFERENCES seasons(season_id)
    );
";

const EVENT_TABLES: &str = "
    CREATE TABLE IF NOT EXISTS competitions (
        id          TEXT PRIMARY KEY,
        name        TEXT NOT NULL,
        category_id TEXT
    );

    CREATE TABLE IF NOT EXISTS event_seasons (
        id             TEXT PRIMARY KEY,
        name           TEXT NOT NULL,
        year           TEXT NOT NULL,
        start_date     TEXT,
        end_date       TEXT,
        competition_id TEXT REFERENCES competitions(id)
    );

    CREATE TABLE IF NOT EXISTS event_teams (
        id           TEXT PRIMARY KEY,
        name         TEXT NOT NULL,
        country      TEXT,
        country_code TEXT,
        abbreviation TEXT
    );

    CREATE TABLE IF NOT EXISTS sport_events (
        id             TEXT PRIMARY KEY,
        start_time     TEXT,
        status         TEXT,
        competition_id TEXT REFERENCES competitions(id),
        season_id      TEXT REFERENCES event_seasons(id),
        home_team_id   TEXT REFERENCES event_teams(id),
        away_team_id   TEXT REFERENCES event_teams(id),
        home_score     INTEGER,
        away_score     INTEGER
    );

    CREATE TABLE IF NOT EXISTS team_game_stats (
        id                              INTEGER PRIMARY KEY AUTOINCREMENT,
        sport_event_id                  TEXT REFERENCES sport_events(id),
        team_id                         TEXT REFERENCES event_teams(id),
        assists                         INTEGER,
        defensive_rebounds              INTEGER,
        offensive_rebounds              INTEGER,
        rebounds                        INTEGER,
        fouls                           INTEGER,
        steals                          INTEGER,
        shots_blocked                   INTEGER,
        turnovers                       INTEGER,
        free_throw_attempts_successful  INTEGER,
        free_throw_attempts_total       INTEGER,
        two_point_attempts_successful   INTEGER,
        two_point_attempts_total        INTEGER,
        three_point_attempts_successful INTEGER,
        three_point_attempts_total      INTEGER,
        possessions                     REAL,
        oreb_pct                        REAL,
        dreb_pct                        REAL,
        ast_to                          REAL,
        to_pct                          REAL,
        UNIQUE (sport_event_id, team_id)
    );

    CREATE TABLE IF NOT EXISTS event_players (
        id        TEXT PRIMARY KEY,
        name      TEXT,
        team_id   TEXT REFERENCES event_teams(id),
        season_id TEXT REFERENCES event_seasons(id)
    );

    CREATE TABLE IF NOT EXISTS player_game_stats (
        id                       INTEGER PRIMARY KEY AUTOINCREMENT,
        player_id                TEXT REFERENCES event_players(id),
        sport_event_id           TEXT REFERENCES sport_events(id),
        minutes                  TEXT,
        points                   INTEGER,
        assists                  INTEGER,
        total_rebounds           INTEGER,
        defensive_rebounds       INTEGER,
        offensive_rebounds       INTEGER,
        blocks                   INTEGER,
        steals                   INTEGER,
        turnovers                INTEGER,
        personal_fouls           INTEGER,
        field_goals_attempted    INTEGER,
        field_goals_made         INTEGER,
        three_pointers_attempted INTEGER,
        three_pointers_made      INTEGER,
        free_throws_attempted    INTEGER,
        free_throws_made         INTEGER,
        UNIQUE (player_id, sport_event_id)
    );

    CREATE TABLE IF NOT EXISTS season_player_totals (
        player_id      TEXT REFERENCES event_players(id),
        season_id      TEXT REFERENCES event_seasons(id),
        points_total   INTEGER,
        rebounds_total INTEGER,
        assists_total  INTEGER,
        blocks_total   INTEGER,
        steals_total   INTEGER,
        games_played   INTEGER,
        updated_at     TEXT NOT NULL,
        PRIMARY KEY (player_id, season_id)
    );
";

/// Full DDL for both the season-aggregate and the event tables.
pub fn create_statements() -> String {
    let team_stats = stats_table_ddl(
        "team_stats",
        "tm_name   TEXT REFERENCES teams(tm_name),
        season_id TEXT REFERENCES seasons(season_id)",
        TEAM_STAT_COLUMNS,
    );
    let player_stats = stats_table_ddl(
        "player_stats",
        "name      TEXT REFERENCES players(name),
        tm_name   TEXT REFERENCES teams(tm_name),
        season_id TEXT REFERENCES seasons(season_id),
        role      TEXT,
        nat       TEXT,
        height    INTEGER,
        age       INTEGER",
        PLAYER_STAT_COLUMNS,
    );
    format!("{SEASON_TABLES}\n{team_stats}\n{player_stats}\n{EVENT_TABLES}")
}

fn stats_table_ddl(table: &str, key_columns: &str, stat_columns: &[&str]) -> String {
    let stats = stat_columns
        .iter()
        .map(|c| format!("        {c} REAL"))
        .collect::<Vec<_>>()
        .join(",\n");
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        {key_columns},
{stats}
    );"
    )
}
