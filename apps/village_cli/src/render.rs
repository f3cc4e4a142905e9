use chrono::{DateTime, Utc};
use shared::records::{HelpRequest, Suggestion, User, Village};

fn when(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

pub fn user(user: &User) {
    println!("{} <{}>", user.name, user.email);
    println!("  id:      {}", user.id);
    println!("  role:    {}", user.role);
    if !user.village_id.is_empty() {
        println!("  village: {}", user.village_id);
    }
    if !user.phone.is_empty() {
        println!("  phone:   {}", user.phone);
    }
    if !user.is_active {
        println!("  (deactivated)");
    }
}

pub fn village_row(village: &Village) {
    println!(
        "{:<34} {:<28} pop {:>7}  {}",
        village.id, village.name, village.population, village.location.address
    );
}

pub fn villages(villages: &[Village]) {
    if villages.is_empty() {
        println!("no villages");
        return;
    }
    villages.iter().for_each(village_row);
}

pub fn village_detail(village: &Village) {
    println!("{} ({})", village.name, village.id);
    if !village.description.is_empty() {
        println!("  {}", village.description);
    }
    println!(
        "  location:   {:.5}, {:.5} {}",
        village.location.latitude, village.location.longitude, village.location.address
    );
    println!("  population: {}", village.population);
    if !village.area.is_empty() {
        println!("  area:       {} km2", village.area);
    }
    if !village.admin_name.is_empty() {
        println!(
            "  admin:      {} {}",
            village.admin_name, village.admin_contact
        );
    }
    println!("  active:     {}", village.is_active);
    println!("  updated:    {}", when(village.updated_at));
}

pub fn help_requests(requests: &[HelpRequest]) {
    if requests.is_empty() {
        println!("no help requests");
        return;
    }
    for request in requests {
        println!(
            "{:<34} [{:<11}] {:<14} p{} {}  by {} on {}",
            request.id,
            request.status,
            request.category,
            request.priority.ordinal(),
            request.title,
            request.user_name,
            when(request.created_at)
        );
        if !request.admin_notes.is_empty() {
            println!("    notes: {}", request.admin_notes);
        }
    }
}

pub fn suggestions(suggestions: &[Suggestion]) {
    if suggestions.is_empty() {
        println!("no suggestions");
        return;
    }
    for suggestion in suggestions {
        let mark = match (suggestion.is_reviewed, suggestion.is_implemented) {
            (_, true) => "implemented",
            (true, false) => "reviewed",
            (false, false) => "open",
        };
        println!(
            "{:<34} +{:<4} {:<11} {}  by {}",
            suggestion.id, suggestion.upvotes, mark, suggestion.title, suggestion.user_name
        );
        if !suggestion.admin_response.is_empty() {
            println!("    response: {}", suggestion.admin_response);
        }
    }
}
