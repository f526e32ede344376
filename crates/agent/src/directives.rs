//! System directives the loop injects into the conversation.

use naturalmaps_core::protocol::ProtocolMarkers;

/// Sent once, before the first completion request.
pub fn planning_directive(
    markers: &ProtocolMarkers,
    function_names: &[&str],
    remaining_iterations: u32,
) -> String {
    format!(
        "Let's first understand the problem and break it down into simple steps. \
         For example, if asked \"Find child-friendly parks in Pankow, Berlin\", first search \
         for parks in Pankow, then check tag keys and values for child-friendliness.\n\
         Output the plan starting with the header '{header}' followed by a concise numbered \
         list of steps. Each step should correspond to a specific function from the following \
         list: [{functions}].\n\
         You have {remaining_iterations} iterations remaining.\n\
         Avoid adding any steps that do not directly involve these functions, and do not \
         include specific settings or parameters of the function calls.\n\
         End the plan with {plan_end}. Do not repeat or create a new plan.",
        header = markers.plan_header,
        functions = function_names.join(", "),
        plan_end = markers.plan_end,
    )
}

/// Sent after every function result.
pub fn step_directive(markers: &ProtocolMarkers, current_step: u32) -> String {
    let next_step = current_step.saturating_add(1);
    format!(
        "Does the function response contain enough information to answer step {current_step}?\n\
         If yes: return a message describing what you will do in step {next_step} and, if \
         necessary, call the next function.\n\
         If not: return a message saying the attempt at step {current_step} failed and the \
         best way to overcome this problem.\n\
         If you do not have an adequate function to run the next step, or if some steps \
         failed, skip to the final step. Explain what worked and what didn't, and give any \
         useful information from partial results.\n\
         Start each message with '{tag}'. End your final message with {terminal}",
        tag = markers.step_tag(current_step),
        terminal = markers.terminal,
    )
}
