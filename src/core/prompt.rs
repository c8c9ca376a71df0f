/// Prompt assembly — persona (system) and task (user) instructions.
use crate::schema::competency::ResolvedCompetency;
use crate::schema::essay::EssayRequest;

/// Role instructions for the simulated student.
///
/// `note` is appended verbatim as a final sentence when present.
pub fn build_persona(request: &EssayRequest, note: Option<&str>) -> String {
    let mut persona = format!(
        "You are a {} student completing a {} for your {} class on the topic of '{}'. \
         Write only as well as the competency you are given; never exceed it.",
        request.grade_level, request.assignment_type, request.subject, request.topic
    );
    if let Some(note) = note.map(str::trim).filter(|n| !n.is_empty()) {
        persona.push(' ');
        persona.push_str(note);
    }
    persona
}

/// One description of the student's ability, built from all three
/// resolved descriptors.
pub fn build_competency(competency: &ResolvedCompetency) -> String {
    format!(
        "You demonstrate {}, your writing shows {}, and your essay has {}. \
         Reflect exactly this level of ability in everything you write.",
        competency.knowledge_desc, competency.grammar_desc, competency.flow_desc
    )
}

/// Join competency, template and labeled sections into the task
/// instruction. Parts are separated by a blank line; sections keep their
/// given order and render as `label:\ncontent`.
pub fn compose_task(competency: &str, template: &str, sections: &[(String, String)]) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(sections.len() + 2);
    parts.push(competency.to_string());
    if !template.trim().is_empty() {
        parts.push(template.to_string());
    }
    for (label, content) in sections {
        parts.push(format!("{label}:\n{content}"));
    }
    parts.join("\n\n")
}
