//! System instructions and request rendering.

use tripforge_core::trip::TripRequest;

/// Built-in system instructions, used unless a prompt file is configured.
pub const SYSTEM_PROMPT: &str = r#"You are an experienced camping and road-trip route planner.

Plan a day-by-day camping route between the traveller's origin and destination
for the given dates. Prefer real, currently operating campsites and give
accurate addresses and coordinates.

You have one tool, `web_search`, which takes a single string argument `query`.
Use it when you need facts you are unsure about (campsite names, addresses,
coordinates, seasons, official websites). Ask for one search at a time and keep
the number of searches small.

When you are done, reply with exactly one JSON object and nothing else, using
this shape:

{
  "trip": {
    "user_id": "string",
    "name": "string",
    "description": "string",
    "start_position": "string",
    "end_position": "string",
    "start_date": "YYYY-MM-DD",
    "end_date": "YYYY-MM-DD",
    "total_days": 1,
    "route_summary": "string"
  },
  "daily_plan": [
    {
      "day": 1,
      "date": "YYYY-MM-DD",
      "location": {
        "name": "string",
        "address": "string or null",
        "site_url": "string or null",
        "latitude": 0.0,
        "longitude": 0.0,
        "notes": "string or null"
      }
    }
  ]
}

Copy user_id, name, description, start_position, end_position, start_date and
end_date from the request unchanged. Use one daily_plan entry per day, numbered
from 1."#;

/// Tool-result text sent back when the model's search call cannot be run.
pub const MALFORMED_SEARCH_NOTE: &str = "The web_search call could not be run: it needs a \
single non-empty string argument named \"query\". Call web_search again with a query, \
or reply with the final JSON plan.";

/// Render the user turn for a request.
pub fn render_user_prompt(request: &TripRequest) -> String {
    format!(
        "Please plan a camping route based on the following information:\n\
         \n\
         User ID: {user_id}\n\
         Trip name: {name}\n\
         Description: {description}\n\
         Start location: {start}\n\
         End location: {end}\n\
         Start date: {start_date}\n\
         End date: {end_date}\n\
         \n\
         Using this information, plan a camping route from {start} to {end} \
         for {start_date} - {end_date}. Prepare a detailed plan in JSON format.",
        user_id = request.user_id,
        name = request.name,
        description = request.description,
        start = request.start_position,
        end = request.end_position,
        start_date = request.start_date,
        end_date = request.end_date,
    )
}

/// Read system instructions from a file, rejecting empty files.
pub fn load_system_prompt(path: &std::path::Path) -> std::io::Result<String> {
    let prompt = std::fs::read_to_string(path)?;
    if prompt.trim().is_empty() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("system prompt file {} is empty", path.display()),
        ));
    }
    Ok(prompt)
}
