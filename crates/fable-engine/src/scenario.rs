//! Static genre and role data used to seed a new adventure.

/// A playable genre with its selectable roles. Each role carries an opening
/// line fragment the narrator continues from.
pub struct Genre {
    pub name: &'static str,
    pub description: &'static str,
    pub roles: &'static [(&'static str, &'static str)],
}

pub const GENRES: &[Genre] = &[
    Genre {
        name: "Fantasy",
        description: "Swords, sorcery, and ancient ruins",
        roles: &[
            ("Peasant", "You're working in the fields of a small village when"),
            ("Noble", "You're waking up from your bed in your mansion when"),
            ("Mage", "You're studying ancient tomes in your tower when"),
            ("Knight", "You're training in the castle courtyard when"),
            ("Ranger", "You're tracking animals in the deep forest when"),
            ("Thief", "You're casing a noble's house from an alley in a city when"),
            ("Bard", "You're performing in a crowded tavern when"),
            ("Cleric", "You're tending to the sick in the temple when"),
        ],
    },
    Genre {
        name: "Sci-Fi",
        description: "Starships, aliens, and distant colonies",
        roles: &[
            ("Space Marine", "You're conducting patrol on a derelict space station when"),
            ("Scientist", "You're analyzing alien samples in your lab when"),
            ("Android", "You're performing system diagnostics on your ship when"),
            ("Pilot", "You're navigating through an asteroid field when"),
            ("Engineer", "You're repairing the FTL drive when"),
            ("Bounty Hunter", "You're tracking a target through a spaceport when"),
            ("Starship Captain", "You're commanding the bridge during warp travel when"),
        ],
    },
    Genre {
        name: "Cyberpunk",
        description: "Neon streets, chrome, and corporate intrigue",
        roles: &[
            ("Hacker", "You're breaching a corporate network when"),
            ("Street Samurai", "You're patrolling the neon-lit streets when"),
            ("Corporate Agent", "You're closing a deal in a high-rise office when"),
            ("Techie", "You're modifying cyberware in your workshop when"),
            ("Drone Operator", "You're steering a surveillance drone from your command van when"),
            ("Information Courier", "You're carrying sensitive data through dangerous streets when"),
        ],
    },
    Genre {
        name: "Post-Apocalyptic",
        description: "Ruins, scarcity, and survival",
        roles: &[
            ("Survivor", "You're scavenging the ruins of an old city when"),
            ("Scavenger", "You're searching a pre-collapse bunker when"),
            ("Raider", "You're ambushing a convoy in the wasteland when"),
            ("Medic", "You're treating radiation sickness in your clinic when"),
            ("Trader", "You're bartering supplies at a wasteland outpost when"),
        ],
    },
];

/// A chosen starting scenario.
#[derive(Clone, Debug)]
pub struct Scenario {
    pub genre: String,
    pub role: String,
    pub character_name: String,
    pub starter: String,
}

impl Scenario {
    pub fn new(genre: &Genre, role_index: usize, character_name: impl Into<String>) -> Self {
        let (role, starter) = genre.roles[role_index % genre.roles.len()];
        Self {
            genre: genre.name.to_string(),
            role: role.to_string(),
            character_name: character_name.into(),
            starter: starter.to_string(),
        }
    }

    /// The pinned system turn injected at session start.
    pub fn system_prompt(&self) -> String {
        format!(
            "You are the Dungeon Master of a {} adventure. The player is {}, a {}. \
             Narrate the world in second person, stay in character, keep each reply \
             to a few paragraphs, and always end at a moment where the player can act. \
             Never speak for the player.",
            self.genre, self.character_name, self.role
        )
    }

    /// The opening narration seed shown to the player and sent as the first
    /// narrator turn.
    pub fn opening(&self) -> String {
        format!("{}...", self.starter)
    }
}
