//! Built-in example plant

use hydro_agents_patterns::OptimizationGoals;

/// A 15 MGD conventional surface-water plant looking to cut chemical and
/// energy use without new construction
pub fn example_plant() -> OptimizationGoals {
    OptimizationGoals::new()
        .with_parameter("source_water_turbidity", "12-18 NTU, seasonal variation")
        .with_parameter("source_water_pH", "7.2-7.8")
        .with_parameter("total_organic_carbon", "3.2-4.5 mg/L")
        .with_parameter("alkalinity", "110 mg/L as CaCO3")
        .with_parameter("hardness", "160 mg/L as CaCO3")
        .with_parameter("manganese", "0.08 mg/L")
        .with_parameter("iron", "0.15 mg/L")
        .with_parameter("temperature_range", "8-22°C seasonal variation")
        .with_parameter("plant_capacity", "15 MGD design, 10 MGD average")
        .with_parameter(
            "existing_processes",
            "Conventional: coagulation, flocculation, sedimentation, filtration, disinfection",
        )
        .with_parameter("available_chemicals", "Alum, polymer, chlorine, caustic soda, PAC, permanganate")
        .with_parameter("discharge_constraints", "Backwash water recovery required, limited discharge permit")
        .with_parameter("space_constraints", "Limited footprint for new processes")
        .with_target("finished_water_turbidity", "<0.1 NTU 95% of time, never >0.3 NTU")
        .with_target("disinfection_byproducts", "THMs <40 μg/L, HAA5 <30 μg/L")
        .with_target("chemical_consumption", "Reduce coagulant usage by 15% without compromising quality")
        .with_target("energy_efficiency", "Reduce energy consumption by 10%")
        .with_target(
            "water_loss",
            "Improve filter run times by 20%, reduce backwash water to <2% of production",
        )
        .with_target("operational_stability", "Maintain stable operation across seasonal water quality variations")
        .with_target("capital_constraints", "Optimize existing infrastructure, minimal new construction")
}
