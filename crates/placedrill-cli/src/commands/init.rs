//! The `placedrill init` command.

use anyhow::Result;

pub fn execute() -> Result<()> {
    if std::path::Path::new("placedrill.toml").exists() {
        println!("placedrill.toml already exists, skipping.");
    } else {
        std::fs::write("placedrill.toml", SAMPLE_CONFIG)?;
        println!("Created placedrill.toml");
    }

    std::fs::create_dir_all("content")?;
    for (name, body) in [
        ("placement.json", SAMPLE_PLACEMENT),
        ("exercises.json", SAMPLE_EXERCISES),
        ("rules.json", SAMPLE_RULES),
    ] {
        let path = std::path::Path::new("content").join(name);
        if path.exists() {
            println!("content/{name} already exists, skipping.");
        } else {
            std::fs::write(&path, body)?;
            println!("Created content/{name}");
        }
    }

    println!("\nNext steps:");
    println!("  1. Edit placedrill.toml (set PLACEDRILL_GEMINI_KEY for verdict flips)");
    println!("  2. Run: placedrill validate");
    println!("  3. Run: placedrill run");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# placedrill configuration

content_dir = "./content"
database = "./placedrill.db"
default_lang = "uk"

[engine]
max_regenerations = 2
batch_max = 4
short_delay_days = 2
week_delay_days = 7
explain_timeout_secs = 12

# Uncomment to enable verdict flips on near-miss answers:
# [explainer]
# type = "gemini"
# api_key = "${PLACEDRILL_GEMINI_KEY}"
# model = "gemini-2.0-flash"
"#;

const SAMPLE_PLACEMENT: &str = r#"{
  "items": [
    {
      "id": "p1",
      "rule_key": "unit_in",
      "kind": "freetext",
      "instruction": "Fill in the missing preposition.",
      "prompt": "The cat is ___ the box.",
      "canonical": "in",
      "accepted_variants": ["inside"]
    },
    {
      "id": "p2",
      "rule_key": "unit_present_simple",
      "kind": "mcq",
      "instruction": "Choose the correct form.",
      "prompt": "She ___ to school every day.",
      "canonical": "goes",
      "options": ["go", "goes", "going", "gone"]
    },
    {
      "id": "p3",
      "rule_key": "unit_stative",
      "kind": "multiselect",
      "instruction": "Pick all stative verbs.",
      "prompt": "Which of these are stative verbs?",
      "canonical": "know,believe",
      "options": ["know", "run", "believe", "jump"]
    }
  ]
}
"#;

const SAMPLE_EXERCISES: &str = r#"{
  "exercises": [
    {
      "rule_key": "unit_in",
      "items": [
        {
          "kind": "freetext",
          "prompt": "The book is ___ the bag.",
          "canonical": "in"
        },
        {
          "kind": "freetext",
          "prompt": "The keys are ___ the drawer.",
          "canonical": "in"
        }
      ]
    },
    {
      "rule_key": "unit_present_simple",
      "items": [
        {
          "kind": "mcq",
          "prompt": "He ___ coffee in the morning.",
          "canonical": "drinks",
          "options": ["drink", "drinks", "drinking", "drank"]
        }
      ]
    },
    {
      "rule_key": "unit_stative",
      "items": [
        {
          "kind": "multiselect",
          "prompt": "Which verbs describe states?",
          "canonical": "own,love",
          "options": ["own", "swim", "love", "write"]
        }
      ]
    }
  ]
}
"#;

const SAMPLE_RULES: &str = r#"{
  "rules": [
    {
      "rule_key": "unit_in",
      "title": "Preposition 'in'",
      "explanation": {
        "en": "Use 'in' when something is contained within something else.",
        "uk": "Вживайте 'in', коли щось знаходиться всередині чогось."
      },
      "examples": ["The cat is in the box.", "The milk is in the fridge."]
    },
    {
      "rule_key": "unit_present_simple",
      "title": "Present Simple, third person",
      "explanation": {
        "en": "Third person singular verbs take -s in the present simple.",
        "uk": "У Present Simple дієслова третьої особи однини отримують -s."
      },
      "examples": ["She walks to work.", "He reads every evening."]
    },
    {
      "rule_key": "unit_stative",
      "title": "Stative verbs",
      "explanation": {
        "en": "Stative verbs describe states, not actions, and avoid continuous forms.",
        "uk": "Статичні дієслова описують стани, а не дії."
      },
      "examples": ["I know the answer.", "They own a house."]
    }
  ]
}
"#;
